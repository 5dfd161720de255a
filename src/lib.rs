//! # colgraph — a property-graph core over a wide-column super-column store
//!
//! Translates a property-graph model — typed nodes with attribute maps, and
//! directed, typed, keyed relationships with their own attribute maps — into
//! a fixed physical layout of column families (§4.3), and maintains the
//! multi-family indices that make relationship traversal, reverse
//! traversal, and existence queries possible without scanning.
//!
//! ## Design principles
//!
//! 1. **Trait-first**: [`StorageBackend`] is the contract between the graph
//!    engine and any wide-column store with super-columns.
//! 2. **Engine owns state; handles are views**: [`Engine`] exclusively owns
//!    the backend and table state; [`NodeHandle`]/[`RelationshipHandle`] hold
//!    only an identity and a reference back to the engine.
//! 3. **Denormalize for single-slice traversal**: every adjacency entry
//!    carries a hydrated copy of both endpoints' attributes, at the cost of
//!    refreshing them on every attribute write (§4.9).
//! 4. **Backend-agnostic**: the in-memory and durable backends implement the
//!    same trait; [`Graph`] is generic over it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use colgraph::{Graph, PropertyMap, storage::InMemoryBackend};
//!
//! # async fn example() -> colgraph::Result<()> {
//! let graph = Graph::open_memory("example");
//!
//! let mut spiderpig = graph.create_node("test_type", "spiderpig", PropertyMap::new()).await?;
//! let cow = graph.create_node("test_type", "cow", PropertyMap::new()).await?;
//! spiderpig.edges("friend").create(cow.identity(), None, PropertyMap::new()).await?;
//!
//! assert!(spiderpig.edges("friend").contains("cow").await?);
//! # let _ = InMemoryBackend::new();
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod handle;
pub mod key;
pub mod model;
pub mod storage;
pub mod traverse;
pub mod tx;

pub use engine::Engine;
pub use error::{Error, Result};
pub use handle::{NodeHandle, RelationshipEdges, RelationshipHandle};
pub use model::{Direction, NodeKey, PropertyMap, RelationshipKey, RelationshipRecord, Value};
pub use storage::{BackendConfig, StorageBackend};
pub use traverse::depth_first;

/// The primary entry point: a keyspace-scoped view over one storage
/// backend, returning handles rather than raw records (§6 "Programmatic
/// surface").
pub struct Graph<B: StorageBackend> {
    engine: Engine<B>,
}

impl<B: StorageBackend> Graph<B> {
    /// Construct a graph from `(keyspace_name, backend)` (§6).
    pub fn with_backend(keyspace: impl Into<String>, backend: B) -> Self {
        Self { engine: Engine::new(keyspace, backend) }
    }

    pub fn engine(&self) -> &Engine<B> {
        &self.engine
    }

    /// Create a node, persisting it and wiring it into its type's
    /// reference node (§4.7).
    pub async fn create_node(
        &self,
        node_type: impl Into<String>,
        key: impl Into<String>,
        attrs: PropertyMap,
    ) -> Result<NodeHandle<'_, B>> {
        let record = self.engine.create_node(&node_type.into(), &key.into(), attrs).await?;
        Ok(NodeHandle::new(&self.engine, record.identity, record.attributes))
    }

    /// Look up a node by identity.
    pub async fn get_node(&self, node_type: impl Into<String>, key: impl Into<String>) -> Result<NodeHandle<'_, B>> {
        let record = self.engine.get_node(&node_type.into(), &key.into()).await?;
        Ok(NodeHandle::new(&self.engine, record.identity, record.attributes))
    }

    /// `get_reference_node(name)`: the per-type index node, created on
    /// first call and idempotent thereafter (§4.7, §8 scenario 4).
    pub async fn get_reference_node(&self, node_type: impl Into<String>) -> Result<NodeHandle<'_, B>> {
        let record = self.engine.get_reference_node(&node_type.into()).await?;
        Ok(NodeHandle::new(&self.engine, record.identity, record.attributes))
    }

    /// `has_relationship(a, b_key, rel_type)` (§4.10).
    pub async fn has_relationship(
        &self,
        a: &NodeKey,
        b_key: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Result<Vec<RelationshipHandle<'_, B>>> {
        let records = self.engine.has_relationship(a, &b_key.into(), &rel_type.into()).await?;
        Ok(records.into_iter().map(|r| RelationshipHandle::new(&self.engine, r)).collect())
    }
}

impl Graph<storage::InMemoryBackend> {
    /// Open an in-memory graph under `keyspace` — the `"memory"` backend
    /// choice of §6.3.
    pub fn open_memory(keyspace: impl Into<String>) -> Self {
        Self::with_backend(keyspace, storage::InMemoryBackend::new())
    }
}

#[cfg(feature = "durable")]
impl Graph<storage::SledBackend> {
    /// Open a durable graph rooted at a filesystem path — any non-`"memory"`
    /// backend choice of §6.3.
    pub fn open_durable(keyspace: impl Into<String>, path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::with_backend(keyspace, storage::SledBackend::open(path)?))
    }
}
