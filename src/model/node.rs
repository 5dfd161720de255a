//! Node identity and materialized snapshot.

use serde::{Deserialize, Serialize};

use super::PropertyMap;

/// A node's identity: `(type, key)`, both non-empty ASCII-safe strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub node_type: String,
    pub key: String,
}

impl NodeKey {
    pub fn new(node_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self { node_type: node_type.into(), key: key.into() }
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.node_type, self.key)
    }
}

/// A read-only snapshot of a node's attributes as last loaded from the
/// backend. [`crate::handle::NodeHandle`] wraps this with dirty-buffer
/// staging for mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub identity: NodeKey,
    pub attributes: PropertyMap,
}

impl NodeRecord {
    pub fn new(identity: NodeKey, attributes: PropertyMap) -> Self {
        Self { identity, attributes }
    }
}
