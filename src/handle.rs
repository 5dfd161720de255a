//! Node and relationship handles (§4.11).
//!
//! A handle is a *view*, not an owner (§3 "Ownership"): it holds an
//! identity, a reference to the engine that materialized it, and a
//! dirty-buffer staging pair (`committed`/`pending`) per the design notes'
//! "explicit staging struct" resolution of the source's ad hoc dirty flag.
//! Reads consult `pending` first, then `committed`; `commit` merges
//! `pending` into `committed` and persists via the engine.

use crate::engine::Engine;
use crate::error::{Result, UsageError};
use crate::model::{Direction, NodeKey, PropertyMap, RelationshipKey, RelationshipRecord, Value};
use crate::storage::StorageBackend;

/// A view over a node: `(type, key)` plus staged attribute edits.
pub struct NodeHandle<'e, B: StorageBackend> {
    engine: &'e Engine<B>,
    identity: NodeKey,
    committed: PropertyMap,
    pending: PropertyMap,
    dirty: bool,
    deleted: bool,
}

impl<'e, B: StorageBackend> NodeHandle<'e, B> {
    pub(crate) fn new(engine: &'e Engine<B>, identity: NodeKey, committed: PropertyMap) -> Self {
        Self { engine, identity, committed, pending: PropertyMap::new(), dirty: false, deleted: false }
    }

    pub fn identity(&self) -> &NodeKey {
        &self.identity
    }

    pub fn node_type(&self) -> &str {
        &self.identity.node_type
    }

    pub fn key(&self) -> &str {
        &self.identity.key
    }

    /// Read an attribute, consulting the pending edit first.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.pending.get(attr).or_else(|| self.committed.get(attr))
    }

    /// Stage an attribute write. Not visible to other handles until
    /// [`NodeHandle::commit`].
    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        self.pending.insert(attr.into(), value.into());
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The attribute map as it would be persisted right now: committed
    /// values overlaid with any pending edits.
    pub fn attributes(&self) -> PropertyMap {
        let mut merged = self.committed.clone();
        merged.extend(self.pending.clone());
        merged
    }

    /// Merge `pending` into `committed` and persist via [`Engine::save_node`]
    /// (§4.9), refreshing every adjacency entry that denormalizes this
    /// node's attributes. A no-op if nothing is staged.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if !self.dirty {
            return Ok(());
        }
        let merged = self.attributes();
        self.engine.save_node(&self.identity, &merged).await?;
        self.committed = merged;
        self.pending.clear();
        self.dirty = false;
        Ok(())
    }

    /// Delete this node (§4.8). The handle cannot be used afterward.
    pub async fn delete(mut self) -> Result<()> {
        self.ensure_alive()?;
        self.engine.delete_node(&self.identity).await?;
        self.deleted = true;
        Ok(())
    }

    /// The relationship factory for `rel_type` rooted at this node (§4.11).
    pub fn edges<'h>(&'h self, rel_type: impl Into<String>) -> RelationshipEdges<'e, 'h, B> {
        RelationshipEdges { engine: self.engine, node: &self.identity, rel_type: rel_type.into() }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.deleted {
            return Err(UsageError::NodeAlreadyDeleted {
                node_type: self.identity.node_type.clone(),
                key: self.identity.key.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// A view over a relationship, with the same dirty-buffer staging as
/// [`NodeHandle`] but over relationship attributes only (§4.11).
pub struct RelationshipHandle<'e, B: StorageBackend> {
    engine: &'e Engine<B>,
    record: RelationshipRecord,
    pending: PropertyMap,
    dirty: bool,
    deleted: bool,
}

impl<'e, B: StorageBackend> RelationshipHandle<'e, B> {
    pub(crate) fn new(engine: &'e Engine<B>, record: RelationshipRecord) -> Self {
        Self { engine, record, pending: PropertyMap::new(), dirty: false, deleted: false }
    }

    pub fn identity(&self) -> &RelationshipKey {
        &self.record.identity
    }

    /// The full materialized record this handle wraps, for callers that
    /// need the denormalized endpoint attributes too (e.g. a traversal
    /// predicate).
    pub fn record(&self) -> &RelationshipRecord {
        &self.record
    }

    pub fn source(&self) -> &NodeKey {
        &self.record.source
    }

    pub fn target(&self) -> &NodeKey {
        &self.record.target
    }

    pub fn direction(&self) -> Direction {
        self.record.direction
    }

    /// The endpoint this relationship was traversed *to*: `target` if read
    /// from an outgoing slice, `source` if read from an incoming one.
    pub fn other_endpoint(&self) -> &NodeKey {
        self.record.other_endpoint()
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.pending.get(attr).or_else(|| self.record.attributes.get(attr))
    }

    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        self.pending.insert(attr.into(), value.into());
        self.dirty = true;
    }

    pub fn attributes(&self) -> PropertyMap {
        let mut merged = self.record.attributes.clone();
        merged.extend(self.pending.clone());
        merged
    }

    /// Merge `pending` into `committed` and upsert the relationship's own
    /// attributes under its existing super-column (§4.11).
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if !self.dirty {
            return Ok(());
        }
        let merged = self.attributes();
        self.engine
            .save_relationship(&self.record.identity, &self.record.source, &self.record.target, &merged)
            .await?;
        self.record.attributes = merged;
        self.pending.clear();
        self.dirty = false;
        Ok(())
    }

    /// Delete this relationship (§4.6). The handle cannot be used afterward.
    pub async fn delete(mut self) -> Result<()> {
        self.ensure_alive()?;
        self.engine
            .delete_relationship(
                &self.record.identity.rel_type,
                &self.record.identity.rel_key,
                &self.record.source,
                &self.record.target,
            )
            .await?;
        self.deleted = true;
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.deleted {
            return Err(UsageError::RelationshipAlreadyDeleted {
                rel_type: self.record.identity.rel_type.clone(),
                rel_key: self.record.identity.rel_key.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// A typed relationship factory rooted at one node for one `rel_type`
/// (§4.11): `node.edges("friend")` returns this rather than exposing
/// relationship types as dynamic attribute lookups.
pub struct RelationshipEdges<'e, 'h, B: StorageBackend> {
    engine: &'e Engine<B>,
    node: &'h NodeKey,
    rel_type: String,
}

impl<'e, 'h, B: StorageBackend> RelationshipEdges<'e, 'h, B> {
    /// (a) Create an edge from this node to `target`.
    pub async fn create(
        &self,
        target: &NodeKey,
        key: Option<String>,
        attrs: PropertyMap,
    ) -> Result<RelationshipHandle<'e, B>> {
        let record = self.engine.create_relationship(&self.rel_type, self.node, target, key, attrs).await?;
        Ok(RelationshipHandle::new(self.engine, record))
    }

    /// (c) This node's outgoing edges of `rel_type`.
    pub async fn outgoing(&self) -> Result<Vec<RelationshipHandle<'e, B>>> {
        let records = self.engine.outgoing(self.node, &self.rel_type).await?;
        Ok(records.into_iter().map(|r| RelationshipHandle::new(self.engine, r)).collect())
    }

    /// (c) This node's incoming edges of `rel_type`.
    pub async fn incoming(&self) -> Result<Vec<RelationshipHandle<'e, B>>> {
        let records = self.engine.incoming(self.node, &self.rel_type).await?;
        Ok(records.into_iter().map(|r| RelationshipHandle::new(self.engine, r)).collect())
    }

    /// (b) Iterate outgoing then incoming edges of `rel_type` (§4.11 "a
    /// factory can be ... iterated to yield outgoing then incoming edges").
    pub async fn all(&self) -> Result<Vec<RelationshipHandle<'e, B>>> {
        let mut out = self.outgoing().await?;
        out.extend(self.incoming().await?);
        Ok(out)
    }

    /// (d) Is `other_key` connected to this node by `rel_type`, in either
    /// direction? Backed by the O(1) pair index (§4.10): both endpoints of
    /// a relationship get their own marker row at creation time, so a
    /// single lookup rooted at this node answers it regardless of whether
    /// this node was the source or the target.
    pub async fn contains(&self, other_key: &str) -> Result<bool> {
        Ok(!self.engine.has_relationship(self.node, other_key, &self.rel_type).await?.is_empty())
    }

    /// (e) The relationships of `rel_type` specifically between this node
    /// and the node keyed `other_key`, in either direction.
    pub async fn with(&self, other_key: &str) -> Result<Vec<RelationshipHandle<'e, B>>> {
        let matches = self
            .all()
            .await?
            .into_iter()
            .filter(|edge| edge.other_endpoint().key == other_key)
            .collect();
        Ok(matches)
    }
}
