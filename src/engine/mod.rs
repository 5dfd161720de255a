//! # Graph engine
//!
//! Owns the physical schema (§4.3) and implements node/relationship CRUD,
//! adjacency and pair-index maintenance, the batching discipline (§5), and
//! the reference-node pattern (§4.7). Everything above this module —
//! [`crate::handle::NodeHandle`], [`crate::handle::RelationshipHandle`],
//! [`crate::handle::RelationshipEdges`] — is a thin view over the methods
//! here; the engine is the only thing that talks to a [`StorageBackend`].

mod payload;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::key::{self, SEP};
use crate::model::{Direction, NodeKey, NodeRecord, PropertyMap, RelationshipKey, RelationshipRecord};
use crate::storage::{ColumnMap, StorageBackend, TableSpec};
use crate::tx::scoped_batch;

pub const REFERENCE_TYPE: &str = "reference";
pub const INSTANCE_REL_TYPE: &str = "instance";
const REFERENCE_ATTR: &str = "reference";

const TABLE_OUTBOUND: &str = "adjacency_outbound";
const TABLE_INBOUND: &str = "adjacency_inbound";
const TABLE_PAIR_INDEX: &str = "pair_index";

/// The graph engine: a keyspace name plus the storage backend it exclusively
/// owns (§3 "Ownership"). Generic over [`StorageBackend`] so the in-memory
/// and durable backends are interchangeable (§4's "Backend polymorphism").
pub struct Engine<B: StorageBackend> {
    keyspace: String,
    backend: B,
}

impl<B: StorageBackend> Engine<B> {
    /// Construct an engine over `backend`, namespacing every table this
    /// engine creates under `keyspace` so several engines may safely share
    /// one physical backend.
    pub fn new(keyspace: impl Into<String>, backend: B) -> Self {
        Self { keyspace: keyspace.into(), backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn table(&self, suffix: &str) -> String {
        format!("{}{SEP}{suffix}", self.keyspace)
    }

    fn outbound_table(&self) -> String {
        self.table(TABLE_OUTBOUND)
    }

    fn inbound_table(&self) -> String {
        self.table(TABLE_INBOUND)
    }

    fn pair_index_table(&self) -> String {
        self.table(TABLE_PAIR_INDEX)
    }

    fn node_table(&self, node_type: &str) -> String {
        self.table(&format!("node{SEP}{node_type}"))
    }

    async fn ensure_node_table(&self, node_type: &str) -> Result<String> {
        let table = self.node_table(node_type);
        if !self.backend.table_exists(&table).await? {
            self.backend.create_table(&table, TableSpec { super_column: false }).await?;
        }
        Ok(table)
    }

    async fn ensure_super_tables(&self) -> Result<()> {
        for table in [self.outbound_table(), self.inbound_table(), self.pair_index_table()] {
            if !self.backend.table_exists(&table).await? {
                self.backend.create_table(&table, TableSpec { super_column: true }).await?;
            }
        }
        Ok(())
    }

    /// Run `f` inside a scoped backend batch: commits on `Ok`, discards on
    /// `Err` (§5).
    async fn batch<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        scoped_batch(&self.backend, f).await
    }

    // ------------------------------------------------------------------
    // Nodes (§4.7, §4.8, §4.9)
    // ------------------------------------------------------------------

    /// Create a node and, unless it is itself a reference node, wire it
    /// into the `instance` edge from its type's reference node (§4.7).
    pub async fn create_node(
        &self,
        node_type: &str,
        key: &str,
        attrs: PropertyMap,
    ) -> Result<NodeRecord> {
        self.insert_node_row(node_type, key, &attrs).await?;

        if node_type != REFERENCE_TYPE {
            let reference = self.get_reference_node(node_type).await?;
            self.create_relationship(
                INSTANCE_REL_TYPE,
                &reference.identity,
                &NodeKey::new(node_type, key),
                Some(key.to_string()),
                PropertyMap::new(),
            )
            .await?;
        }

        Ok(NodeRecord::new(NodeKey::new(node_type, key), attrs))
    }

    /// Write a node's per-type row without touching the reference-node
    /// machinery. Split out of [`Engine::create_node`] so
    /// [`Engine::get_reference_node`] can create a reference node without a
    /// mutually-recursive async call back into `create_node`.
    async fn insert_node_row(&self, node_type: &str, key: &str, attrs: &PropertyMap) -> Result<()> {
        key::validate_component(node_type)?;
        key::validate_component(key)?;

        let table = self.ensure_node_table(node_type).await?;
        let encoded = encode_property_map(attrs)?;
        debug!(node_type, key, "create_node");
        self.backend.insert(&table, key, encoded).await
    }

    /// Look up a node by identity. `Err(NodeNotFound)` if its per-type row
    /// is absent.
    pub async fn get_node(&self, node_type: &str, key: &str) -> Result<NodeRecord> {
        let table = self.node_table(node_type);
        let row = self.backend.get(&table, key).await?;
        let Some(row) = row else {
            return Err(Error::NodeNotFound { node_type: node_type.to_string(), key: key.to_string() });
        };
        Ok(NodeRecord::new(NodeKey::new(node_type, key), decode_property_map(&row)?))
    }

    /// `get_reference_node`, creating the reference node for `node_type` on
    /// first call (§4.7). The second and subsequent calls perform no writes
    /// (§8 scenario 4).
    pub async fn get_reference_node(&self, node_type: &str) -> Result<NodeRecord> {
        match self.get_node(REFERENCE_TYPE, node_type).await {
            Ok(found) => Ok(found),
            Err(Error::NodeNotFound { .. }) => {
                let mut attrs = PropertyMap::new();
                attrs.insert(REFERENCE_ATTR.to_string(), REFERENCE_ATTR.into());
                self.insert_node_row(REFERENCE_TYPE, node_type, &attrs).await?;
                Ok(NodeRecord::new(NodeKey::new(REFERENCE_TYPE, node_type), attrs))
            }
            Err(other) => Err(other),
        }
    }

    /// Refresh every adjacency entry that embeds this node's attributes
    /// (§4.9): outgoing edges carry them as `source__*`, incoming edges as
    /// `target__*`. Also rewrites the node's own per-type row.
    pub async fn save_node(&self, node: &NodeKey, attrs: &PropertyMap) -> Result<()> {
        self.ensure_super_tables().await?;
        let table = self.node_table(&node.node_type);
        let row = key::endpoint_key(&node.node_type, &node.key);
        let encoded = encode_property_map(attrs)?;

        let (full_start, full_end) = key::full_row_slice_bounds();
        let outgoing = self.backend.get_slice(&self.outbound_table(), &row, &full_start, &full_end, None).await?;
        let incoming = self.backend.get_slice(&self.inbound_table(), &row, &full_start, &full_end, None).await?;

        self.batch(|| async {
            debug!(node_type = %node.node_type, key = %node.key, "save_node");
            self.backend.insert(&table, &node.key, encoded.clone()).await?;

            // Outgoing edges: this node is the source; refresh `source__*`.
            for (super_key, _) in &outgoing {
                self.refresh_endpoint_attrs(&row, super_key, Direction::Outgoing, attrs).await?;
            }
            // Incoming edges: this node is the target; refresh `target__*`.
            for (super_key, _) in &incoming {
                self.refresh_endpoint_attrs(&row, super_key, Direction::Incoming, attrs).await?;
            }
            Ok(())
        })
        .await
    }

    /// One half of §4.9: given a super-column this node appears in as
    /// `direction`, rewrite its own `{source,target}__*` columns on both the
    /// row it was read from and the mirrored row on the other endpoint.
    async fn refresh_endpoint_attrs(
        &self,
        own_row: &str,
        super_key: &str,
        direction: Direction,
        attrs: &PropertyMap,
    ) -> Result<()> {
        let (own_table, other_table) = match direction {
            Direction::Outgoing => (self.outbound_table(), self.inbound_table()),
            Direction::Incoming => (self.inbound_table(), self.outbound_table()),
        };
        let prefix = match direction {
            Direction::Outgoing => "source__",
            Direction::Incoming => "target__",
        };

        let Some(existing) = self.backend.get_super(&own_table, own_row, super_key).await? else {
            return Ok(());
        };
        let mut refreshed = ColumnMap::new();
        for (name, value) in attrs {
            refreshed.insert(format!("{prefix}{name}"), value.encode()?);
        }

        self.backend.insert_super(&own_table, own_row, super_key, refreshed.clone()).await?;

        let other_row = if direction == Direction::Outgoing {
            key::endpoint_key(
                existing.get("target__type").map(String::as_str).unwrap_or_default(),
                existing.get("target__key").map(String::as_str).unwrap_or_default(),
            )
        } else {
            key::endpoint_key(
                existing.get("source__type").map(String::as_str).unwrap_or_default(),
                existing.get("source__key").map(String::as_str).unwrap_or_default(),
            )
        };
        self.backend.insert_super(&other_table, &other_row, super_key, refreshed).await?;
        Ok(())
    }

    /// Delete a node: purge every adjacency entry and pair-index marker
    /// that references it, then its own rows (§4.8, fixing the distilled
    /// design's dangling pair-index markers per §9).
    pub async fn delete_node(&self, node: &NodeKey) -> Result<()> {
        self.ensure_super_tables().await?;
        let own_row = key::endpoint_key(&node.node_type, &node.key);
        let (full_start, full_end) = key::full_row_slice_bounds();
        let outgoing = self.backend.get_slice(&self.outbound_table(), &own_row, &full_start, &full_end, None).await?;
        let incoming = self.backend.get_slice(&self.inbound_table(), &own_row, &full_start, &full_end, None).await?;

        self.batch(|| async {
            debug!(node_type = %node.node_type, key = %node.key, "delete_node");

            for (super_key, columns) in &outgoing {
                let other = endpoint_from(columns, "target");
                self.backend.remove_super(&self.inbound_table(), &key::endpoint_key(&other.node_type, &other.key), super_key).await?;
                self.remove_pair_markers(node, &other, super_key).await?;
            }
            for (super_key, columns) in &incoming {
                let other = endpoint_from(columns, "source");
                self.backend.remove_super(&self.outbound_table(), &key::endpoint_key(&other.node_type, &other.key), super_key).await?;
                self.remove_pair_markers(node, &other, super_key).await?;
            }

            self.backend.remove_row(&self.outbound_table(), &own_row).await?;
            self.backend.remove_row(&self.inbound_table(), &own_row).await?;
            self.backend.remove_row(&self.pair_index_table(), &own_row).await?;

            let table = self.node_table(&node.node_type);
            self.backend.remove_row(&table, &node.key).await?;
            Ok(())
        })
        .await
    }

    /// Remove both pair-index markers for one super-column, on both sides
    /// of the pair (the marker this node held on `other`, and the mirrored
    /// marker `other` held on this node).
    async fn remove_pair_markers(&self, node: &NodeKey, other: &NodeKey, super_key: &str) -> Result<()> {
        let Some((rel_type, _rel_key)) = key::split_relationship_super_key(super_key) else {
            return Ok(());
        };
        let rel_type = rel_type.to_string();
        let own_row = key::endpoint_key(&node.node_type, &node.key);
        let other_row = key::endpoint_key(&other.node_type, &other.key);
        self.backend
            .remove_columns(&self.pair_index_table(), &own_row, Some(&other.key), std::slice::from_ref(&rel_type))
            .await?;
        self.backend
            .remove_columns(&self.pair_index_table(), &other_row, Some(&node.key), std::slice::from_ref(&rel_type))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relationships (§4.5, §4.6, §4.10)
    // ------------------------------------------------------------------

    /// Create a relationship under one batch so invariants 1-2 (§3) can
    /// never be observed half-applied (§4.5).
    pub async fn create_relationship(
        &self,
        rel_type: &str,
        source: &NodeKey,
        target: &NodeKey,
        rel_key: Option<String>,
        attrs: PropertyMap,
    ) -> Result<RelationshipRecord> {
        key::validate_component(rel_type)?;
        self.ensure_super_tables().await?;

        let rel_key = rel_key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let identity = RelationshipKey::new(rel_type.to_string(), rel_key.clone());
        let super_key = key::relationship_super_key(rel_type, &rel_key);

        let source_attrs = self.get_node(&source.node_type, &source.key).await?.attributes;
        let target_attrs = self.get_node(&target.node_type, &target.key).await?.attributes;

        let columns = payload::build(&identity, source, &source_attrs, target, &target_attrs, &attrs)?;
        let source_row = key::endpoint_key(&source.node_type, &source.key);
        let target_row = key::endpoint_key(&target.node_type, &target.key);

        self.batch(|| async {
            debug!(rel_type, rel_key = %rel_key, "create_relationship");
            self.backend.insert_super(&self.outbound_table(), &source_row, &super_key, columns.clone()).await?;
            self.backend.insert_super(&self.inbound_table(), &target_row, &super_key, columns.clone()).await?;

            let mut source_marker = ColumnMap::new();
            source_marker.insert(rel_type.to_string(), payload::encode_marker(rel_type, &rel_key, Direction::Outgoing));
            self.backend.insert_super(&self.pair_index_table(), &source_row, &target.key, source_marker).await?;

            let mut target_marker = ColumnMap::new();
            target_marker.insert(rel_type.to_string(), payload::encode_marker(rel_type, &rel_key, Direction::Incoming));
            self.backend.insert_super(&self.pair_index_table(), &target_row, &source.key, target_marker).await?;
            Ok(())
        })
        .await?;

        payload::parse(&super_key, &columns, Direction::Outgoing)
    }

    /// Delete a relationship by identity, removing both adjacency
    /// super-columns and both pair-index markers in one batch (§4.6, fixed
    /// per §9). Idempotent: removing an absent entry is a no-op.
    pub async fn delete_relationship(
        &self,
        rel_type: &str,
        rel_key: &str,
        source: &NodeKey,
        target: &NodeKey,
    ) -> Result<()> {
        self.ensure_super_tables().await?;
        let super_key = key::relationship_super_key(rel_type, rel_key);
        let source_row = key::endpoint_key(&source.node_type, &source.key);
        let target_row = key::endpoint_key(&target.node_type, &target.key);

        self.batch(|| async {
            debug!(rel_type, rel_key, "delete_relationship");
            self.backend.remove_super(&self.outbound_table(), &source_row, &super_key).await?;
            self.backend.remove_super(&self.inbound_table(), &target_row, &super_key).await?;
            self.backend
                .remove_columns(&self.pair_index_table(), &source_row, Some(&target.key), &[rel_type.to_string()])
                .await?;
            self.backend
                .remove_columns(&self.pair_index_table(), &target_row, Some(&source.key), &[rel_type.to_string()])
                .await?;
            Ok(())
        })
        .await
    }

    /// Upsert a relationship's own attributes without touching its
    /// endpoints' denormalized copies (used by
    /// [`crate::handle::RelationshipHandle::commit`]).
    pub async fn save_relationship(
        &self,
        identity: &RelationshipKey,
        source: &NodeKey,
        target: &NodeKey,
        attrs: &PropertyMap,
    ) -> Result<()> {
        self.ensure_super_tables().await?;
        let super_key = key::relationship_super_key(&identity.rel_type, &identity.rel_key);
        let source_row = key::endpoint_key(&source.node_type, &source.key);
        let target_row = key::endpoint_key(&target.node_type, &target.key);

        let existing = self
            .backend
            .get_super(&self.outbound_table(), &source_row, &super_key)
            .await?
            .ok_or_else(|| Error::RelationshipNotFound {
                rel_type: identity.rel_type.clone(),
                rel_key: identity.rel_key.clone(),
            })?;

        let mut columns = ColumnMap::new();
        for (name, value) in attrs {
            columns.insert(name.clone(), value.encode()?);
        }
        for (name, value) in &existing {
            if name.starts_with("source__") || name.starts_with("target__") || name == "rel_type" || name == "rel_key" {
                columns.insert(name.clone(), value.clone());
            }
        }

        self.batch(|| async {
            debug!(rel_type = %identity.rel_type, rel_key = %identity.rel_key, "save_relationship");
            self.backend.insert_super(&self.outbound_table(), &source_row, &super_key, columns.clone()).await?;
            self.backend.insert_super(&self.inbound_table(), &target_row, &super_key, columns).await?;
            Ok(())
        })
        .await
    }

    /// §4.4: list this node's outgoing edges of `rel_type` with one slice.
    pub async fn outgoing(&self, node: &NodeKey, rel_type: &str) -> Result<Vec<RelationshipRecord>> {
        key::validate_component(rel_type)?;
        let row = key::endpoint_key(&node.node_type, &node.key);
        let (start, end) = key::rel_type_slice_bounds(rel_type);
        let slice = self.backend.get_slice(&self.outbound_table(), &row, &start, &end, None).await?;
        slice.iter().map(|(k, cols)| payload::parse(k, cols, Direction::Outgoing)).collect()
    }

    /// Symmetric to [`Engine::outgoing`] on the inbound table.
    pub async fn incoming(&self, node: &NodeKey, rel_type: &str) -> Result<Vec<RelationshipRecord>> {
        key::validate_component(rel_type)?;
        let row = key::endpoint_key(&node.node_type, &node.key);
        let (start, end) = key::rel_type_slice_bounds(rel_type);
        let slice = self.backend.get_slice(&self.inbound_table(), &row, &start, &end, None).await?;
        slice.iter().map(|(k, cols)| payload::parse(k, cols, Direction::Incoming)).collect()
    }

    /// §4.10: does a relationship of `rel_type` exist between `a` and the
    /// node keyed `b_key`? O(1) via the pair index rather than a slice scan.
    ///
    /// Per §9's resolved open question, the pair index collapses multiple
    /// same-type relationships between the same ordered pair to the most
    /// recently created one; this returns that single marker's relationship
    /// (or none).
    pub async fn has_relationship(&self, a: &NodeKey, b_key: &str, rel_type: &str) -> Result<Vec<RelationshipRecord>> {
        key::validate_component(rel_type)?;
        let a_row = key::endpoint_key(&a.node_type, &a.key);
        let Some(markers) = self.backend.get_super(&self.pair_index_table(), &a_row, b_key).await? else {
            return Ok(Vec::new());
        };
        let Some(raw) = markers.get(rel_type) else {
            return Ok(Vec::new());
        };
        let Some((rel_type, rel_key, direction)) = payload::decode_marker(raw) else {
            warn!(raw, "unparsable pair-index marker");
            return Ok(Vec::new());
        };

        let super_key = key::relationship_super_key(&rel_type, &rel_key);
        let table = match direction {
            Direction::Outgoing => self.outbound_table(),
            Direction::Incoming => self.inbound_table(),
        };
        match self.backend.get_super(&table, &a_row, &super_key).await? {
            Some(columns) => Ok(vec![payload::parse(&super_key, &columns, direction)?]),
            None => Ok(Vec::new()),
        }
    }
}

fn endpoint_from(columns: &ColumnMap, prefix: &str) -> NodeKey {
    NodeKey::new(
        columns.get(&format!("{prefix}__type")).cloned().unwrap_or_default(),
        columns.get(&format!("{prefix}__key")).cloned().unwrap_or_default(),
    )
}

fn encode_property_map(attrs: &PropertyMap) -> Result<ColumnMap> {
    let mut out = ColumnMap::new();
    for (name, value) in attrs {
        out.insert(name.clone(), value.encode()?);
    }
    Ok(out)
}

fn decode_property_map(columns: &ColumnMap) -> Result<PropertyMap> {
    let mut out = PropertyMap::new();
    for (name, raw) in columns {
        out.insert(name.clone(), crate::model::Value::decode(raw)?);
    }
    Ok(out)
}
