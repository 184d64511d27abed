//! DPOR race detection and branch-point analysis (§4.3), grounded in
//! `asupersync::trace::dpor`'s race-detector/co-enabled shape.

use crate::backtrack::BackTrackQueue;
use crate::event::{Event, Unique};
use crate::explored::ExploredTracker;
use crate::graph::DependencyGraph;

/// A completed interleaving, in dispatch order.
pub type Trace = Vec<Unique>;

/// Co-enabledness test for a pair of trace positions (§4.3).
pub fn is_co_enabled(graph: &DependencyGraph, trace: &Trace, earlier_idx: usize, later_idx: usize) -> bool {
    let earlier = &trace[earlier_idx];
    let later = &trace[later_idx];

    if matches!(earlier.event, Event::NetworkPartition { .. }) || matches!(later.event, Event::NetworkPartition { .. }) {
        return true;
    }
    if matches!(earlier.event, Event::WaitQuiescence) || matches!(later.event, Event::WaitQuiescence) {
        return false;
    }

    match (earlier.event.as_msg(), later.event.as_msg()) {
        (Some(e), Some(l)) => {
            if e.receiver != l.receiver {
                return false;
            }
            let same_epoch = graph.quiescent_period(earlier.id) == graph.quiescent_period(later.id);
            if !same_epoch {
                return false;
            }
            !graph.is_ancestor(earlier.id, later.id) && !graph.is_ancestor(later.id, earlier.id)
        }
        _ => false,
    }
}

fn trace_index_of(trace: &Trace, id: u64) -> i64 {
    trace
        .iter()
        .position(|u| u.id == id)
        .map(|i| i as i64)
        .unwrap_or(-1)
}

/// Branch-point analysis for a co-enabled pair (§4.3 table). Returns
/// `(branch_idx, replay_prefix)` on a real dependency, `None` otherwise.
///
/// The three rows of the spec's table are distinguished by variant, not by
/// a fourth "nothing to do" case: co-enabled pairs always yield a branch
/// point, so this never actually returns `None` for inputs that passed
/// [`is_co_enabled`] — the `Option` exists for callers analyzing arbitrary
/// pairs directly.
pub fn analyze_dep(
    graph: &DependencyGraph,
    trace: &Trace,
    earlier_idx: usize,
    later_idx: usize,
) -> crate::errors::Result<Option<(i64, Vec<Unique>)>> {
    let earlier = trace[earlier_idx].clone();
    let later = trace[later_idx].clone();

    let earlier_is_partition = matches!(earlier.event, Event::NetworkPartition { .. });
    let later_is_partition = matches!(later.event, Event::NetworkPartition { .. });

    if earlier.event.is_msg() && later_is_partition {
        return Ok(Some((earlier_idx as i64, vec![later, earlier])));
    }

    if earlier_is_partition && later.event.is_msg() {
        let mut prefix: Vec<Unique> = trace[earlier_idx + 1..=later_idx].to_vec();
        prefix.push(earlier);
        return Ok(Some(((earlier_idx as i64) - 1, prefix)));
    }

    if earlier.event.is_msg() && later.event.is_msg() {
        let shared = graph.last_shared_ancestor(earlier.id, later.id)?;
        let branch_idx = trace_index_of(trace, shared);
        let start = usize::try_from(branch_idx + 1).unwrap_or(0);
        let mut prefix: Vec<Unique> = trace[start..=later_idx].to_vec();
        prefix.retain(|u| u.id != earlier.id);
        return Ok(Some((branch_idx, prefix)));
    }

    Ok(None)
}

/// Run race detection over a completed interleaving, enqueueing newly
/// discovered branch points onto `backtrack` and marking them explored.
pub fn detect_races(
    graph: &DependencyGraph,
    trace: &Trace,
    explored: &mut ExploredTracker,
    backtrack: &mut BackTrackQueue,
) -> crate::errors::Result<usize> {
    let mut enqueued = 0;
    for earlier_idx in 0..trace.len() {
        for later_idx in (earlier_idx + 1)..trace.len() {
            if !is_co_enabled(graph, trace, earlier_idx, later_idx) {
                continue;
            }
            let Some((branch_idx, replay_prefix)) = analyze_dep(graph, trace, earlier_idx, later_idx)? else {
                continue;
            };
            let earlier_id = trace[earlier_idx].id;
            let later_id = trace[later_idx].id;
            if explored.contains(branch_idx, earlier_id, later_id) {
                continue;
            }
            explored.mark(branch_idx, earlier_id, later_id);
            backtrack.push(branch_idx, (later_id, earlier_id), replay_prefix);
            enqueued += 1;
        }
    }
    Ok(enqueued)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::event::{MsgEvent, Payload};
    use proptest::prelude::*;

    fn msg(receiver: &str) -> Event {
        Event::Msg(MsgEvent {
            sender: None,
            receiver: receiver.into(),
            payload: Payload::new("x", serde_json::json!(null)),
        })
    }

    /// Builds the two-sibling race fixture and returns the trace in
    /// `order` (`false` = `[a, b]`, `true` = the replayed-reversal `[b,
    /// a]`), so the same logical race can be re-detected from either run.
    fn race_trace(order: bool) -> (DependencyGraph, Trace) {
        let mut g = DependencyGraph::new();
        let p = g.alloc_id();
        let p_unique = g.insert_msg(msg("P"), p, 0, 0);
        let a = g.alloc_id();
        let a_unique = g.insert_msg(msg("C"), a, p, 0);
        let b = g.alloc_id();
        let b_unique = g.insert_msg(msg("C"), b, p, 0);
        let trace = if order {
            vec![p_unique, b_unique, a_unique]
        } else {
            vec![p_unique, a_unique, b_unique]
        };
        (g, trace)
    }

    proptest! {
        /// Testable Property 6: a race already explored in one delivery
        /// order must not be re-enqueued when the replayed run delivers
        /// the same two events in the opposite order.
        #[test]
        fn prop_explored_tracker_dedup_is_order_independent(first_order in any::<bool>()) {
            let (g1, trace1) = race_trace(first_order);
            let mut explored = ExploredTracker::new();
            let mut backtrack = BackTrackQueue::new();
            detect_races(&g1, &trace1, &mut explored, &mut backtrack).unwrap();
            let after_first = backtrack.len();
            prop_assert_eq!(after_first, 1);

            let (g2, trace2) = race_trace(!first_order);
            detect_races(&g2, &trace2, &mut explored, &mut backtrack).unwrap();
            prop_assert_eq!(backtrack.len(), after_first, "reversed replay must not re-enqueue the same race");
        }
    }
}
