//! Relationship identity and materialized snapshot.

use serde::{Deserialize, Serialize};

use super::{NodeKey, PropertyMap};

/// A relationship's identity: `(rel_type, rel_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub rel_type: String,
    pub rel_key: String,
}

impl RelationshipKey {
    pub fn new(rel_type: impl Into<String>, rel_key: impl Into<String>) -> Self {
        Self { rel_type: rel_type.into(), rel_key: rel_key.into() }
    }
}

/// Which direction this relationship was enumerated from, relative to the
/// node whose adjacency it was read out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A read-only snapshot of a relationship, as materialized from an adjacency
/// super-column. Carries both endpoints' identities *and* their attribute
/// maps, denormalized into the super-column per §4.3, so a traversal never
/// needs a second round trip to hydrate the endpoints it just walked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub identity: RelationshipKey,
    pub source: NodeKey,
    pub source_attributes: PropertyMap,
    pub target: NodeKey,
    pub target_attributes: PropertyMap,
    pub attributes: PropertyMap,
    pub direction: Direction,
}

impl RelationshipRecord {
    pub fn other_endpoint(&self) -> &NodeKey {
        match self.direction {
            Direction::Outgoing => &self.target,
            Direction::Incoming => &self.source,
        }
    }

    pub fn other_endpoint_attributes(&self) -> &PropertyMap {
        match self.direction {
            Direction::Outgoing => &self.target_attributes,
            Direction::Incoming => &self.source_attributes,
        }
    }
}
