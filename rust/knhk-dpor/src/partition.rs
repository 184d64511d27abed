//! Network partition bookkeeping (§3 `PartitionMap: map<actor, set<actor>>`,
//! §4.1 decomposition of `NetworkPartition` into per-actor `NodesUnreachable`
//! notifications).

use crate::event::ActorName;
use std::collections::{BTreeMap, BTreeSet};

/// Directed unreachability: `unreachable_from[sender]` names every receiver
/// a send from `sender` must be dropped against.
#[derive(Default)]
pub struct PartitionMap {
    unreachable_from: BTreeMap<ActorName, BTreeSet<ActorName>>,
}

impl PartitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut `group_a` from `group_b` in both directions. Returns the
    /// `(actor, now_unreachable)` pairs the caller decomposes into
    /// `NodesUnreachable` notifications, one per actor naming every newly
    /// unreachable peer on the other side.
    pub fn apply(
        &mut self,
        group_a: &BTreeSet<ActorName>,
        group_b: &BTreeSet<ActorName>,
    ) -> Vec<(ActorName, ActorName)> {
        let mut notifications = Vec::new();
        for a in group_a {
            for b in group_b {
                self.unreachable_from.entry(a.clone()).or_default().insert(b.clone());
                self.unreachable_from.entry(b.clone()).or_default().insert(a.clone());
                notifications.push((a.clone(), b.clone()));
                notifications.push((b.clone(), a.clone()));
            }
        }
        notifications
    }

    pub fn heal(&mut self, group_a: &BTreeSet<ActorName>, group_b: &BTreeSet<ActorName>) {
        for a in group_a {
            for b in group_b {
                if let Some(set) = self.unreachable_from.get_mut(a) {
                    set.remove(b);
                }
                if let Some(set) = self.unreachable_from.get_mut(b) {
                    set.remove(a);
                }
            }
        }
    }

    /// True iff a send from `sender` to `receiver` must be dropped.
    pub fn is_cut(&self, sender: &str, receiver: &str) -> bool {
        self.unreachable_from
            .get(sender)
            .is_some_and(|set| set.contains(receiver))
    }

    pub fn len(&self) -> usize {
        self.unreachable_from.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<ActorName> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn apply_decomposes_into_both_directions() {
        let mut p = PartitionMap::new();
        let notifications = p.apply(&set(&["A"]), &set(&["B", "C"]));
        assert_eq!(notifications.len(), 4);
        assert!(p.is_cut("A", "B"));
        assert!(p.is_cut("C", "A"));
    }

    #[test]
    fn heal_removes_cut_pairs() {
        let mut p = PartitionMap::new();
        p.apply(&set(&["A"]), &set(&["B"]));
        p.heal(&set(&["A"]), &set(&["B"]));
        assert!(!p.is_cut("A", "B"));
        assert!(p.is_empty());
    }
}
