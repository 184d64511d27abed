//! Dependency graph of `Unique` events (§3 `DependencyGraph`, `QuiescentPeriod`).
//!
//! Nodes are arena-indexed by `Unique.id`; edges always point child -> parent,
//! so "path to root" queries are plain id walks (§9 design note).

use crate::errors::{EngineError, Result};
use crate::event::{Event, Unique};
use std::collections::HashMap;

struct Node {
    unique: Unique,
    parent: u64,
    children: Vec<u64>,
}

pub struct DependencyGraph {
    nodes: HashMap<u64, Node>,
    quiescent_period: HashMap<u64, u32>,
    next_id: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            0,
            Node {
                unique: Unique::root(),
                parent: 0,
                children: Vec::new(),
            },
        );
        let mut quiescent_period = HashMap::new();
        quiescent_period.insert(0, 0);
        Self {
            nodes,
            quiescent_period,
            next_id: 1,
        }
    }

    pub fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Insert a `MsgEvent` node with a parent edge to `parent_id`. Caller
    /// (`get_or_create_message`) is responsible for sibling dedup.
    pub fn insert_msg(&mut self, event: Event, id: u64, parent_id: u64, quiescent_epoch: u32) -> Unique {
        debug_assert!(event.is_msg());
        let unique = Unique { event, id };
        self.nodes.insert(
            id,
            Node {
                unique: unique.clone(),
                parent: parent_id,
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.push(id);
        }
        self.quiescent_period.insert(id, quiescent_epoch);
        unique
    }

    /// Insert a partition/quiescence/spawn marker. Markers are rooted
    /// directly at the sentinel (§3: "without parent edges" means "not
    /// chained to the preceding `MsgEvent` cursor", while still satisfying
    /// invariant 1's "exactly one outgoing parent edge, acyclic and rooted").
    pub fn insert_marker(&mut self, event: Event, quiescent_epoch: u32) -> Unique {
        let id = self.alloc_id();
        let unique = Unique {
            event,
            id,
        };
        self.nodes.insert(
            id,
            Node {
                unique: unique.clone(),
                parent: 0,
                children: Vec::new(),
            },
        );
        if let Some(root) = self.nodes.get_mut(&0) {
            root.children.push(id);
        }
        self.quiescent_period.insert(id, quiescent_epoch);
        unique
    }

    pub fn quiescent_period(&self, id: u64) -> Option<u32> {
        self.quiescent_period.get(&id).copied()
    }

    pub fn parent_id(&self, id: u64) -> Option<u64> {
        self.nodes.get(&id).map(|n| n.parent)
    }

    /// Siblings of `id`: nodes sharing the same parent.
    pub fn siblings(&self, parent_id: u64) -> impl Iterator<Item = &Unique> {
        self.nodes
            .get(&parent_id)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(move |child_id| self.nodes.get(child_id).map(|n| &n.unique))
    }

    pub fn get(&self, id: u64) -> Option<&Unique> {
        self.nodes.get(&id).map(|n| &n.unique)
    }

    /// Depth (path length to root) of `id`, used for the depth bound.
    pub fn depth(&self, id: u64) -> usize {
        let mut depth = 0;
        let mut cur = id;
        while cur != 0 {
            match self.nodes.get(&cur) {
                Some(n) => {
                    cur = n.parent;
                    depth += 1;
                }
                None => break,
            }
        }
        depth
    }

    /// Ordered ids from `id` up to and including the root.
    pub fn path_to_root(&self, id: u64) -> Result<Vec<u64>> {
        let mut path = vec![id];
        let mut cur = id;
        while cur != 0 {
            let node = self
                .nodes
                .get(&cur)
                .ok_or_else(|| EngineError::Invariant {
                    detail: format!("path to root missing node {cur}"),
                })?;
            cur = node.parent;
            path.push(cur);
        }
        Ok(path)
    }

    /// True iff `ancestor` lies on `node`'s path to root (inclusive of `node`
    /// itself iff `ancestor == node`).
    pub fn is_ancestor(&self, ancestor: u64, node: u64) -> bool {
        let mut cur = node;
        loop {
            if cur == ancestor {
                return true;
            }
            if cur == 0 {
                return false;
            }
            match self.nodes.get(&cur) {
                Some(n) => cur = n.parent,
                None => return false,
            }
        }
    }

    /// Deepest node id that lies on both `a`'s and `b`'s path to root.
    pub fn last_shared_ancestor(&self, a: u64, b: u64) -> Result<u64> {
        let path_a = self.path_to_root(a)?;
        let path_b: std::collections::HashSet<u64> = self.path_to_root(b)?.into_iter().collect();
        path_a
            .into_iter()
            .find(|id| path_b.contains(id))
            .ok_or_else(|| EngineError::Invariant {
                detail: "no shared ancestor found (graph is not rooted)".into(),
            })
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MsgEvent, Payload};

    fn msg(receiver: &str) -> Event {
        Event::Msg(MsgEvent {
            sender: None,
            receiver: receiver.into(),
            payload: Payload::new("x", serde_json::json!(null)),
        })
    }

    #[test]
    fn shared_ancestor_of_siblings_is_their_parent() {
        let mut g = DependencyGraph::new();
        let p = g.alloc_id();
        g.insert_msg(msg("P"), p, 0, 0);
        let a = g.alloc_id();
        g.insert_msg(msg("A"), a, p, 0);
        let b = g.alloc_id();
        g.insert_msg(msg("B"), b, p, 0);
        assert_eq!(g.last_shared_ancestor(a, b).unwrap(), p);
    }

    #[test]
    fn is_ancestor_detects_causal_chain() {
        let mut g = DependencyGraph::new();
        let a = g.alloc_id();
        g.insert_msg(msg("A"), a, 0, 0);
        let b = g.alloc_id();
        g.insert_msg(msg("B"), b, a, 0);
        assert!(g.is_ancestor(a, b));
        assert!(!g.is_ancestor(b, a));
    }

    #[test]
    fn markers_root_at_sentinel() {
        let mut g = DependencyGraph::new();
        let u = g.insert_marker(Event::WaitQuiescence, 0);
        assert_eq!(g.parent_id(u.id), Some(0));
    }
}
