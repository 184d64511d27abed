//! Clock-cluster minimization plan (§4.4 `ClockClusterizer`).
//!
//! Messages are grouped by the application-level logical clock they carry;
//! timers (no clock, but `causes_clock_increment`) are swept independently.
//! The clusterizer only decides *which candidate subsets to try next* — it
//! never runs the oracle itself, that's [`super::minimize`]'s job.

use crate::config::Aggressiveness;
use crate::event::Unique;
use std::collections::BTreeMap;

/// A trace partitioned by logical clock, plus the timer ids interleaved
/// among the clustered events.
pub struct ClockClusters {
    /// Clock value -> ids of events carrying that clock, in trace order.
    pub clusters: BTreeMap<u64, Vec<u64>>,
    /// Ids of events with no clock that still advance one (timers).
    pub timer_ids: Vec<u64>,
    /// Ids with no clock and no clock-increment flag: always kept.
    pub unclustered_ids: Vec<u64>,
}

pub fn cluster_trace(trace: &[Unique]) -> ClockClusters {
    let mut clusters: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut timer_ids = Vec::new();
    let mut unclustered_ids = Vec::new();

    for unique in trace {
        let Some(msg) = unique.event.as_msg() else { continue };
        if let Some(clock) = msg.payload.logical_clock {
            clusters.entry(clock).or_default().push(unique.id);
        } else if msg.payload.causes_clock_increment {
            timer_ids.push(unique.id);
        } else {
            unclustered_ids.push(unique.id);
        }
    }

    ClockClusters { clusters, timer_ids, unclustered_ids }
}

/// One candidate to try against the oracle: the set of ids to drop from
/// the original trace, and whether this step represents a cluster removal
/// (vs. a timer-only sweep).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub drop_ids: Vec<u64>,
    pub cluster: Option<u64>,
}

/// Build the ordered sequence of candidates to try, per §4.4's iteration
/// plan and the configured [`Aggressiveness`].
///
/// Iteration 0 sweeps timers alone; then each remaining clock is tried for
/// removal (together with a fresh timer sweep over the residual trace).
/// `STOP_IMMEDIATELY` truncates the timer sweep to a single subset (all
/// timers at once); `ALL_TIMERS_FIRST_ITR` is exhaustive only in iteration
/// 0; `NONE` is exhaustive on every cluster.
pub fn build_iteration_plan(clusters: &ClockClusters, aggressiveness: Aggressiveness) -> Vec<Candidate> {
    let mut plan = Vec::new();

    plan.extend(timer_subsets(&clusters.timer_ids, aggressiveness, true));

    for (&clock, ids) in &clusters.clusters {
        let mut drop_ids = ids.clone();
        let exhaustive = matches!(aggressiveness, Aggressiveness::None);
        for timer_subset in timer_subsets(&clusters.timer_ids, if exhaustive { Aggressiveness::None } else { aggressiveness }, false) {
            let mut combined = drop_ids.clone();
            combined.extend(timer_subset.drop_ids);
            plan.push(Candidate { drop_ids: combined, cluster: Some(clock) });
        }
        drop_ids.clear();
    }

    plan
}

fn timer_subsets(timer_ids: &[u64], aggressiveness: Aggressiveness, first_iteration: bool) -> Vec<Candidate> {
    if timer_ids.is_empty() {
        return vec![Candidate { drop_ids: Vec::new(), cluster: None }];
    }

    let exhaustive = match aggressiveness {
        Aggressiveness::None => true,
        Aggressiveness::AllTimersFirstItr => first_iteration,
        Aggressiveness::StopImmediately => false,
    };

    if exhaustive {
        (1..=timer_ids.len())
            .rev()
            .map(|n| Candidate { drop_ids: timer_ids[..n].to_vec(), cluster: None })
            .collect()
    } else {
        vec![Candidate { drop_ids: timer_ids.to_vec(), cluster: None }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, MsgEvent, Payload};

    fn msg_with_clock(id: u64, clock: u64) -> Unique {
        Unique {
            event: Event::Msg(MsgEvent {
                sender: None,
                receiver: "A".into(),
                payload: Payload::new("x", serde_json::json!(null)).with_clock(clock),
            }),
            id,
        }
    }

    fn timer(id: u64) -> Unique {
        Unique {
            event: Event::Msg(MsgEvent {
                sender: None,
                receiver: "A".into(),
                payload: Payload::new("x", serde_json::json!(null)).with_timer(crate::event::TimerMarker {
                    timer_name: "t".into(),
                    inner_msg: serde_json::json!(null),
                    repeating: false,
                    token: 1,
                }),
            }),
            id,
        }
    }

    #[test]
    fn s4_clusters_split_by_logical_clock() {
        let trace = vec![msg_with_clock(1, 1), msg_with_clock(2, 1), msg_with_clock(3, 2), msg_with_clock(4, 3), timer(5), timer(6)];
        let clusters = cluster_trace(&trace);
        assert_eq!(clusters.clusters.len(), 3);
        assert_eq!(clusters.clusters[&1], vec![1, 2]);
        assert_eq!(clusters.timer_ids, vec![5, 6]);
    }

    #[test]
    fn stop_immediately_never_sweeps_timers_exhaustively() {
        let clusters = ClockClusters { clusters: BTreeMap::new(), timer_ids: vec![5, 6], unclustered_ids: Vec::new() };
        let plan = build_iteration_plan(&clusters, Aggressiveness::StopImmediately);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].drop_ids, vec![5, 6]);
    }
}
