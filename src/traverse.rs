//! Depth-first traversal utility (§4.12).
//!
//! Library-level glue: reachable-target enumeration built purely on
//! [`Graph`]'s public handle API ([`crate::handle::RelationshipEdges`]), the
//! same surface any external caller has. It does not reach into
//! [`crate::engine::Engine`] directly.

use std::collections::{HashSet, VecDeque};

use crate::error::Result;
use crate::model::NodeKey;
use crate::model::RelationshipRecord;
use crate::storage::StorageBackend;
use crate::Graph;

/// Walk outgoing edges of `rel_type` from `start` in depth-first order,
/// visiting each target key at most once, keeping only edges for which
/// `predicate` returns `true`. Returns the reached nodes in visitation
/// order (`start` itself is not included).
pub async fn depth_first<B, P>(
    graph: &Graph<B>,
    start: NodeKey,
    rel_type: &str,
    predicate: P,
) -> Result<Vec<NodeKey>>
where
    B: StorageBackend,
    P: Fn(&RelationshipRecord) -> bool,
{
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.key.clone());
    let mut stack: VecDeque<NodeKey> = VecDeque::new();
    stack.push_back(start);
    let mut order = Vec::new();

    while let Some(current) = stack.pop_back() {
        let node = graph.get_node(current.node_type.clone(), current.key.clone()).await?;
        let edges = node.edges(rel_type).outgoing().await?;
        // Reverse so the first-listed edge is explored first despite the
        // stack's LIFO order.
        for edge in edges.into_iter().rev() {
            if !predicate(edge.record()) {
                continue;
            }
            let target = edge.target().clone();
            if visited.insert(target.key.clone()) {
                order.push(target.clone());
                stack.push_back(target);
            }
        }
    }

    Ok(order)
}
