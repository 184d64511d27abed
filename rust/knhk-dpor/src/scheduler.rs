//! The driver / scheduler state machine (§4.1): `DporEngine`.
//!
//! Grounded in `asupersync::trace::dpor`'s single-owner driver shape and the
//! teacher's plain-owned-struct-at-the-boundary style (`knhk-byzantine::ByzantineMAPEK`).
//! Cooperative suspension (§9) is modeled as synchronous return values rather
//! than coroutines: `ActorRuntime::dispatch_new_message` hands back every
//! send it produced, and the driver folds each one through `event_produced`
//! before asking for the next delivery.

use crate::analyzer::detect_races;
use crate::backtrack::BackTrackQueue;
use crate::config::{DivergencePolicy, DporConfig};
use crate::errors::Result;
use crate::event::{ActorName, Event, Payload, Unique};
use crate::explored::ExploredTracker;
use crate::graph::DependencyGraph;
use crate::identity::get_or_create_message;
use crate::minimizer::wildcard::resolver_for;
use crate::minimizer::ReplayGuide;
use crate::partition::PartitionMap;
use crate::pending::{Cell, Envelope, PendingDelivery, PendingEvents};
use crate::runtime::{ActorRuntime, ExternalEvent};
use crate::trace::Trace;
use std::collections::VecDeque;

const SCHEDULER_PARTITION_KIND: &str = "__NetworkPartition__";
const SCHEDULER_QUIESCENCE_KIND: &str = "__WaitQuiescence__";

/// Outcome of a completed interleaving, returned by [`DporEngine::search`].
#[derive(Debug, Default)]
pub struct SearchStats {
    pub interleavings: usize,
    pub traces: Vec<Trace>,
    pub races_found: usize,
    /// Ids the replay monitor expected but never observed firing, one
    /// entry per interleaving that diverged (§7, populated regardless of
    /// [`DivergencePolicy`]; the policy only governs what the engine *does*
    /// with them while running).
    pub divergences: Vec<Vec<u64>>,
}

pub struct DporEngine {
    config: DporConfig,
    graph: DependencyGraph,
    pending: PendingEvents,
    explored: ExploredTracker,
    backtrack: BackTrackQueue,
    partitions: PartitionMap,
    current_trace: Trace,
    next_trace: Vec<Unique>,
    replay_cursor: usize,
    parent_cursor: u64,
    awaiting_quiescence: bool,
    pending_marker: Option<Unique>,
    current_quiescent_period: u32,
    next_quiescent_period: u32,
    invariant_queue: VecDeque<u64>,
    original_externals: Vec<ExternalEvent>,
    externals: VecDeque<ExternalEvent>,
    injection_paused: bool,
    replay_guide: Option<ReplayGuide>,
    guide_cursor: usize,
}

impl DporEngine {
    pub fn new(config: DporConfig) -> Self {
        Self {
            config,
            graph: DependencyGraph::new(),
            pending: PendingEvents::new(),
            explored: ExploredTracker::new(),
            backtrack: BackTrackQueue::new(),
            partitions: PartitionMap::new(),
            current_trace: Trace::new(),
            next_trace: Vec::new(),
            replay_cursor: 0,
            parent_cursor: 0,
            awaiting_quiescence: false,
            pending_marker: None,
            current_quiescent_period: 0,
            next_quiescent_period: 0,
            invariant_queue: VecDeque::new(),
            original_externals: Vec::new(),
            externals: VecDeque::new(),
            injection_paused: false,
            replay_guide: None,
            guide_cursor: 0,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn backtrack_len(&self) -> usize {
        self.backtrack.len()
    }

    /// Arm a wildcard-guided replay (§4.4): [`Self::replay`] will match
    /// pending deliveries against `guide`'s relaxed predicates instead of
    /// `NextTrace`'s exact ids. `None` clears any guide already set.
    pub fn set_replay_guide(&mut self, guide: Option<ReplayGuide>) {
        self.replay_guide = guide;
        self.guide_cursor = 0;
    }

    /// Run a single interleaving of `externals` against `runtime` under
    /// whatever replay guide is currently armed, returning the resulting
    /// trace. Unlike [`Self::search`], this never explores backtrack
    /// points — it is the minimizer's oracle primitive (§4.4, §6), driving
    /// one candidate-weakened replay per call.
    pub fn replay<R: ActorRuntime>(&mut self, runtime: &mut R, externals: Vec<ExternalEvent>) -> Result<Trace> {
        self.original_externals = externals;
        self.guide_cursor = 0;
        self.reset_for_new_run();
        self.run_to_completion(runtime)?;
        Ok(self.current_trace.clone())
    }

    /// Explore every reachable interleaving of `externals` against
    /// `runtime`, returning aggregate statistics (§4.3 "Next-prefix
    /// selection" loop).
    pub fn search<R: ActorRuntime>(&mut self, runtime: &mut R, externals: Vec<ExternalEvent>) -> Result<SearchStats> {
        self.original_externals = externals;
        self.reset_for_new_run();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(self.config.dpor_budget_seconds);
        let mut stats = SearchStats::default();

        loop {
            self.run_to_completion(runtime)?;
            if let Some(divergent) = self.finish_run_divergence_check() {
                stats.divergences.push(divergent);
            }
            stats.interleavings += 1;
            stats.traces.push(self.current_trace.clone());

            stats.races_found += detect_races(&self.graph, &self.current_trace.events, &mut self.explored, &mut self.backtrack)?;

            if std::time::Instant::now() >= deadline {
                tracing::debug!("dpor budget exhausted, returning best effort");
                break;
            }

            match self.backtrack.pop() {
                None => break,
                Some(entry) => {
                    self.next_trace = build_next_trace(&self.current_trace.events, entry.depth_index, entry.replay_prefix);
                    self.explored.trim(entry.depth_index);
                    self.invariant_queue = VecDeque::from(vec![entry.race.1, entry.race.0]);
                    runtime.restart_system()?;
                    self.reset_for_new_run_keep_next_trace();
                }
            }
        }

        Ok(stats)
    }

    fn reset_for_new_run(&mut self) {
        self.next_trace.clear();
        self.reset_for_new_run_keep_next_trace();
    }

    fn reset_for_new_run_keep_next_trace(&mut self) {
        self.pending.clear();
        self.current_trace = Trace::new();
        self.replay_cursor = 0;
        self.parent_cursor = 0;
        self.awaiting_quiescence = false;
        self.pending_marker = None;
        self.current_quiescent_period = 0;
        self.next_quiescent_period = 0;
        self.injection_paused = false;
        self.externals = self.original_externals.clone().into();
    }

    fn run_to_completion<R: ActorRuntime>(&mut self, runtime: &mut R) -> Result<()> {
        self.inject_pending_externals(runtime)?;
        loop {
            match self.schedule_new_message()? {
                Some(delivery) => self.dispatch(delivery, runtime)?,
                None => {
                    if runtime.is_quiescent() {
                        if self.notify_quiescence(runtime)? {
                            return Ok(());
                        }
                    } else {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn inject_pending_externals<R: ActorRuntime>(&mut self, runtime: &mut R) -> Result<()> {
        if self.injection_paused {
            return Ok(());
        }
        while let Some(ev) = self.externals.pop_front() {
            match ev {
                ExternalEvent::Start { name } => {
                    runtime.actor_of(&name)?;
                    self.graph.insert_marker(Event::Spawn { name }, self.current_quiescent_period);
                }
                ExternalEvent::Send { receiver, payload } => {
                    let unique = get_or_create_message(&mut self.graph, self.parent_cursor, None, receiver.clone(), payload.clone());
                    self.pending.push_receiver(
                        &receiver,
                        PendingDelivery {
                            unique: Some(unique),
                            cell: Cell(receiver.clone()),
                            envelope: Envelope { sender: None, receiver, payload },
                        },
                    );
                }
                ExternalEvent::NetworkPartition { group_a, group_b } => {
                    self.pending.push_scheduler(PendingDelivery {
                        unique: None,
                        cell: Cell("__scheduler__".into()),
                        envelope: Envelope {
                            sender: None,
                            receiver: "__scheduler__".into(),
                            payload: Payload::new(SCHEDULER_PARTITION_KIND, serde_json::json!({"group_a": group_a, "group_b": group_b})),
                        },
                    });
                }
                ExternalEvent::WaitQuiescence => {
                    self.pending.push_scheduler(PendingDelivery {
                        unique: None,
                        cell: Cell("__scheduler__".into()),
                        envelope: Envelope {
                            sender: None,
                            receiver: "__scheduler__".into(),
                            payload: Payload::new(SCHEDULER_QUIESCENCE_KIND, serde_json::json!(null)),
                        },
                    });
                    self.injection_paused = true;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Selection order of §4.1: `PRIORITY`, then convergent/divergent
    /// against `NextTrace` (or the wildcard replay guide, when one is
    /// armed), then divergent-only while awaiting quiescence.
    fn schedule_new_message(&mut self) -> Result<Option<PendingDelivery>> {
        loop {
            if let Some(pd) = self.pending.pop_priority() {
                if let Some(pd) = self.admit(pd)? {
                    return Ok(Some(pd));
                }
                continue;
            }

            if self.replay_guide.is_some() {
                let candidate = self
                    .pending
                    .pop_scheduler()
                    .or_else(|| self.take_guided())
                    .or_else(|| self.pending.divergent_pop());
                match candidate {
                    Some(pd) => {
                        if let Some(pd) = self.admit(pd)? {
                            return Ok(Some(pd));
                        }
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            let candidate = if !self.awaiting_quiescence {
                match self.peek_next_trace() {
                    Some(t) => {
                        let found = match &t.event {
                            Event::Msg(m) => self.pending.take_matching_receiver(&m.receiver, &t),
                            Event::NetworkPartition { .. } | Event::WaitQuiescence => self.pending.pop_scheduler(),
                            _ => None,
                        };
                        match found {
                            Some(pd) => {
                                self.replay_cursor += 1;
                                Some(pd)
                            }
                            None => self.pending.divergent_pop(),
                        }
                    }
                    None => self.pending.divergent_pop(),
                }
            } else {
                self.pending.divergent_pop()
            };

            match candidate {
                Some(pd) => {
                    if let Some(pd) = self.admit(pd)? {
                        return Ok(Some(pd));
                    }
                    continue;
                }
                None => return Ok(None),
            }
        }
    }

    /// Resolve the next guide entry against its receiver's pending lane
    /// using the configured [`crate::config::AmbiguityStrategyKind`]
    /// (§4.4). Alternate matches the resolver finds are not explored
    /// further here: a single `replay()` call drives one candidate
    /// interpretation, not a full DPOR search over the ambiguity.
    fn take_guided(&mut self) -> Option<PendingDelivery> {
        let entry = self.replay_guide.as_ref()?.entries.get(self.guide_cursor)?.clone();
        let resolver = resolver_for(self.config.ambiguity_strategy);
        let lane = self.pending.receiver_lane(&entry.receiver);
        let (index, _alternates) = resolver.resolve(&entry.wildcard, lane)?;
        self.guide_cursor += 1;
        self.pending.take_at_receiver(&entry.receiver, index)
    }

    fn peek_next_trace(&mut self) -> Option<Unique> {
        while self.replay_cursor < self.next_trace.len() {
            let u = &self.next_trace[self.replay_cursor];
            if u.is_noise() {
                self.replay_cursor += 1;
                continue;
            }
            return Some(u.clone());
        }
        None
    }

    /// Handle scheduler markers inline and apply the partition-drop rule;
    /// returns `None` when `pd` was consumed internally (marker dispatch,
    /// or a dropped cross-partition send) and selection should continue.
    fn admit(&mut self, pd: PendingDelivery) -> Result<Option<PendingDelivery>> {
        if pd.envelope.payload.kind == SCHEDULER_PARTITION_KIND {
            let group_a: std::collections::BTreeSet<ActorName> = serde_json::from_value(pd.envelope.payload.body["group_a"].clone())?;
            let group_b: std::collections::BTreeSet<ActorName> = serde_json::from_value(pd.envelope.payload.body["group_b"].clone())?;
            let notifications = self.partitions.apply(&group_a, &group_b);
            for (actor, unreachable) in notifications {
                self.pending.push_priority(PendingDelivery {
                    unique: None,
                    cell: Cell(actor.clone()),
                    envelope: Envelope {
                        sender: None,
                        receiver: actor,
                        payload: Payload::nodes_unreachable(&unreachable),
                    },
                });
            }
            let marker = self.graph.insert_marker(Event::NetworkPartition { group_a, group_b }, self.current_quiescent_period);
            self.current_trace.push(marker);
            return Ok(None);
        }

        if pd.envelope.payload.kind == SCHEDULER_QUIESCENCE_KIND {
            let marker = self.graph.insert_marker(Event::WaitQuiescence, self.current_quiescent_period);
            self.next_quiescent_period = marker.id;
            self.pending_marker = Some(marker);
            self.awaiting_quiescence = true;
            return Ok(None);
        }

        if let Some(sender) = &pd.envelope.sender {
            if self.partitions.is_cut(sender, &pd.envelope.receiver) {
                tracing::trace!(sender, receiver = %pd.envelope.receiver, "dropped cross-partition send");
                return Ok(None);
            }
        }

        Ok(Some(pd))
    }

    fn dispatch<R: ActorRuntime>(&mut self, pd: PendingDelivery, runtime: &mut R) -> Result<()> {
        if let Some(unique) = &pd.unique {
            self.current_trace.push(unique.clone());
            self.parent_cursor = unique.id;
            if self.invariant_queue.front() == Some(&unique.id) {
                self.invariant_queue.pop_front();
            }
        }
        let produced = runtime.dispatch_new_message(&pd.cell, &pd.envelope)?;
        for env in produced {
            self.event_produced(pd.cell.clone(), env)?;
        }
        Ok(())
    }

    /// Runtime observed a send from `_from` (§4.1 `event_produced`).
    fn event_produced(&mut self, _from: Cell, envelope: Envelope) -> Result<()> {
        if envelope.payload.is_nodes_unreachable() {
            self.pending.push_priority(PendingDelivery {
                unique: None,
                cell: Cell(envelope.receiver.clone()),
                envelope,
            });
            return Ok(());
        }

        if let Some(bound) = self.config.depth_bound {
            if self.graph.depth(self.parent_cursor) >= bound {
                tracing::trace!(depth_bound = bound, "dropping send past depth bound");
                return Ok(());
            }
        }

        let unique = get_or_create_message(
            &mut self.graph,
            self.parent_cursor,
            envelope.sender.clone(),
            envelope.receiver.clone(),
            envelope.payload.clone(),
        );
        self.pending.push_receiver(
            &envelope.receiver.clone(),
            PendingDelivery { unique: Some(unique), cell: Cell(envelope.receiver.clone()), envelope },
        );
        Ok(())
    }

    /// Remove a timer's pending delivery (§5: "silently ignored" if absent).
    pub fn notify_timer_cancelled(&mut self, receiver: &str, timer_name: &str) {
        self.pending.remove_first_receiver(receiver, |pd| {
            pd.envelope
                .payload
                .timer
                .as_ref()
                .is_some_and(|t| t.timer_name == timer_name)
        });
    }

    /// `true` once the runtime has confirmed idleness *and* no barrier was
    /// pending (meaning this interleaving is over); `false` after merely
    /// committing a `WaitQuiescence` barrier (the run continues).
    fn notify_quiescence<R: ActorRuntime>(&mut self, runtime: &mut R) -> Result<bool> {
        if self.awaiting_quiescence {
            self.current_quiescent_period = self.next_quiescent_period;
            if let Some(marker) = self.pending_marker.take() {
                self.current_trace.push(marker);
            }
            self.awaiting_quiescence = false;
            self.injection_paused = false;
            self.inject_pending_externals(runtime)?;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Compare the replay monitor's expected `[earlier, later]` ids against
    /// what actually fired this run. Routes through [`DivergencePolicy`]
    /// rather than failing the search (§7, §9).
    fn finish_run_divergence_check(&mut self) -> Option<Vec<u64>> {
        if self.invariant_queue.is_empty() {
            return None;
        }
        let expected: Vec<u64> = self.invariant_queue.drain(..).collect();
        match self.config.divergence_policy {
            DivergencePolicy::LogOnly => {
                tracing::debug!(?expected, "replay divergence (log-only policy)");
            }
            DivergencePolicy::TreatAsAbsent => {
                tracing::debug!(?expected, "replay divergence, treating ids as absent");
            }
        }
        Some(expected)
    }
}

/// `currentTrace[0..=branch_idx] ++ replay_prefix` (§4.3 "Next-prefix selection").
fn build_next_trace(current: &[Unique], branch_idx: i64, replay_prefix: Vec<Unique>) -> Vec<Unique> {
    let take = usize::try_from(branch_idx + 1).unwrap_or(0).min(current.len());
    let mut next = current[..take].to_vec();
    next.extend(replay_prefix);
    next
}
