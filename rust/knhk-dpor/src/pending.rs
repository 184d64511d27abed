//! Per-receiver pending-delivery queues plus the `SCHEDULER`/`PRIORITY`
//! reserved lanes (§3 `PendingEvents`).
//!
//! Lane iteration order is a correctness property (§4.1, §9 open question):
//! lanes are kept in a `BTreeMap` so divergent-step round robin is
//! receiver-name lexicographic rather than incidental insertion order.

use crate::event::{ActorName, Unique};
use std::collections::{BTreeMap, VecDeque};

/// Opaque handle to a spawned actor, as understood by the instrumented
/// runtime (§6). The driver never interprets it beyond equality/ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cell(pub ActorName);

/// A message in flight, as observed across the runtime boundary.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: Option<ActorName>,
    pub receiver: ActorName,
    pub payload: crate::event::Payload,
}

/// One entry in a pending-events lane. `unique` is `None` only for
/// decomposed `NodesUnreachable` partition notifications (§4.1).
#[derive(Debug, Clone)]
pub struct PendingDelivery {
    pub unique: Option<Unique>,
    pub cell: Cell,
    pub envelope: Envelope,
}

/// A lane address, used only for reporting/tests; the map itself is keyed
/// directly by lane name internally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lane {
    Scheduler,
    Receiver(ActorName),
}

#[derive(Default)]
pub struct PendingEvents {
    priority: VecDeque<PendingDelivery>,
    scheduler: VecDeque<PendingDelivery>,
    lanes: BTreeMap<ActorName, VecDeque<PendingDelivery>>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.priority.clear();
        self.scheduler.clear();
        self.lanes.clear();
    }

    pub fn push_priority(&mut self, delivery: PendingDelivery) {
        self.priority.push_back(delivery);
    }

    pub fn push_scheduler(&mut self, delivery: PendingDelivery) {
        self.scheduler.push_back(delivery);
    }

    pub fn push_receiver(&mut self, receiver: &str, delivery: PendingDelivery) {
        self.lanes
            .entry(receiver.to_string())
            .or_default()
            .push_back(delivery);
    }

    pub fn pop_priority(&mut self) -> Option<PendingDelivery> {
        self.priority.pop_front()
    }

    pub fn priority_is_empty(&self) -> bool {
        self.priority.is_empty()
    }

    /// Remove the first entry on `receiver`'s lane whose `Unique` equals
    /// `target` (the convergent-step lookup of §4.1).
    pub fn take_matching_receiver(&mut self, receiver: &str, target: &Unique) -> Option<PendingDelivery> {
        let queue = self.lanes.get_mut(receiver)?;
        let idx = queue
            .iter()
            .position(|pd| pd.unique.as_ref().is_some_and(|u| u == target))?;
        queue.remove(idx)
    }

    /// Same lookup against the reserved `SCHEDULER` lane.
    pub fn take_matching_scheduler(&mut self, target: &Unique) -> Option<PendingDelivery> {
        let idx = self
            .scheduler
            .iter()
            .position(|pd| pd.unique.as_ref().is_some_and(|u| u == target))?;
        self.scheduler.remove(idx)
    }

    /// Pop the head of the reserved `SCHEDULER` lane (partitions/quiescence
    /// markers are never ambiguous at a given dispatch point, so no id
    /// match is needed beyond FIFO order).
    pub fn pop_scheduler(&mut self) -> Option<PendingDelivery> {
        self.scheduler.pop_front()
    }

    /// Remove the first entry on `receiver`'s lane matching `pred`, used by
    /// timer cancellation (§5: "missing entries are silently ignored").
    pub fn remove_first_receiver<F>(&mut self, receiver: &str, pred: F) -> Option<PendingDelivery>
    where
        F: Fn(&PendingDelivery) -> bool,
    {
        let queue = self.lanes.get_mut(receiver)?;
        let idx = queue.iter().position(pred)?;
        queue.remove(idx)
    }

    /// Pop any pending delivery, round-robining across lanes in
    /// `SCHEDULER`-first, then receiver-name-lexicographic order.
    pub fn divergent_pop(&mut self) -> Option<PendingDelivery> {
        if let Some(pd) = self.scheduler.pop_front() {
            return Some(pd);
        }
        for queue in self.lanes.values_mut() {
            if let Some(pd) = queue.pop_front() {
                return Some(pd);
            }
        }
        None
    }

    pub fn is_idle(&self) -> bool {
        self.priority.is_empty()
            && self.scheduler.is_empty()
            && self.lanes.values().all(|q| q.is_empty())
    }

    /// Read-only view of a receiver's lane, used by the minimizer's wildcard
    /// matcher to enumerate candidates (§4.4).
    pub fn receiver_lane(&self, receiver: &str) -> &[PendingDelivery] {
        self.lanes
            .get(receiver)
            .map(|q| q.as_slices().0)
            .unwrap_or(&[])
    }

    /// Remove the entry at `index` within `receiver`'s lane, as resolved by
    /// an [`crate::minimizer::wildcard::AmbiguityResolver`] against the
    /// slice returned by [`Self::receiver_lane`].
    pub fn take_at_receiver(&mut self, receiver: &str, index: usize) -> Option<PendingDelivery> {
        self.lanes.get_mut(receiver)?.remove(index)
    }
}
