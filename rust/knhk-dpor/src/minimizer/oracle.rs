//! The minimizer's test-oracle façade (§6 `test(externals, fp, stats)`) and
//! the wildcard replay guide it hands to a (re-)driven search.

use super::cluster::{build_iteration_plan, cluster_trace};
use super::wildcard::WildCard;
use crate::config::DporConfig;
use crate::errors::MinimizerError;
use crate::event::ActorName;
use crate::runtime::{ActorRuntime, ExternalEvent};
use crate::scheduler::DporEngine;
use crate::trace::Trace;
use std::collections::HashSet;

/// One position in a wildcard-guided replay: the original id this entry
/// stands in for, which receiver's lane to match it against, and the
/// relaxed predicate that now matches it.
#[derive(Debug, Clone)]
pub struct GuideEntry {
    pub original_id: u64,
    pub receiver: ActorName,
    pub wildcard: WildCard,
}

/// A replay plan over a trace with some ids dropped: kept events that sat
/// next to a dropped predecessor are rewritten as wildcards, since their
/// exact sibling-derived id may no longer be reproducible (§4.4).
#[derive(Debug, Clone, Default)]
pub struct ReplayGuide {
    pub entries: Vec<GuideEntry>,
}

/// Build the replay guide for a candidate with `drop_ids` removed from
/// `original`: every kept `MsgEvent` becomes a same-receiver wildcard.
pub fn build_replay_guide(original: &Trace, drop_ids: &HashSet<u64>) -> ReplayGuide {
    let entries = original
        .events
        .iter()
        .filter(|u| !drop_ids.contains(&u.id))
        .filter_map(|u| {
            let msg = u.event.as_msg()?;
            let wildcard = if msg.payload.causes_clock_increment {
                WildCard::AnyClockIncrement
            } else {
                WildCard::AnyTo { receiver: msg.receiver.clone() }
            };
            Some(GuideEntry { original_id: u.id, receiver: msg.receiver.clone(), wildcard })
        })
        .collect();
    ReplayGuide { entries }
}

/// What the minimizer expects from a (re-)driven search: replay `externals`
/// under `guide` (or exactly, when `guide` is `None`) and report whether
/// the resulting run still reproduces `fingerprint`.
pub trait Oracle<F> {
    fn test(
        &mut self,
        externals: &[ExternalEvent],
        guide: Option<&ReplayGuide>,
        fingerprint: &F,
    ) -> Result<Option<Trace>, MinimizerError>;
}

#[derive(Debug, Default, Clone)]
pub struct MinimizationStats {
    pub replays: usize,
    pub candidates_tried: usize,
    pub clusters_dropped: usize,
    pub timers_dropped: usize,
}

/// Drive the clock-cluster minimization loop (§4.4) against `oracle`,
/// starting from `original` and the violation `fingerprint` it reproduces.
pub fn minimize<F, O>(
    oracle: &mut O,
    original: &Trace,
    externals: &[ExternalEvent],
    fingerprint: F,
    config: &DporConfig,
) -> Result<(Trace, MinimizationStats), MinimizerError>
where
    F: Clone,
    O: Oracle<F>,
{
    let mut stats = MinimizationStats::default();

    if oracle.test(externals, None, &fingerprint)?.is_none() {
        return Err(MinimizerError::OriginalNotReproduced);
    }
    stats.replays += 1;

    let clusters = cluster_trace(&original.events);
    let plan = build_iteration_plan(&clusters, config.minimizer_aggressiveness);

    let mut permanently_dropped: HashSet<u64> = HashSet::new();
    let mut best = original.clone();

    for candidate in plan {
        stats.candidates_tried += 1;
        let mut drop_ids: HashSet<u64> = permanently_dropped.clone();
        drop_ids.extend(candidate.drop_ids.iter().copied());

        let guide = build_replay_guide(original, &drop_ids);
        let result = oracle.test(externals, Some(&guide), &fingerprint)?;
        stats.replays += 1;

        if let Some(reduced) = result {
            permanently_dropped.extend(candidate.drop_ids.iter().copied());
            if candidate.cluster.is_some() {
                stats.clusters_dropped += 1;
            } else {
                stats.timers_dropped += candidate.drop_ids.len();
            }
            best = reduced;
            tracing::debug!(dropped = candidate.drop_ids.len(), cluster = ?candidate.cluster, "minimizer accepted candidate");
        }
    }

    Ok((best, stats))
}

/// Production [`Oracle`]: drives a fresh [`DporEngine`] through one
/// wildcard-guided (or exact, when `guide` is `None`) replay per call and
/// accepts the candidate when `fingerprint` still judges the result a
/// violation (§6 "`test(externals, fp, stats) -> Option<Trace>`").
///
/// `fingerprint` is any `Fn(&Trace) -> bool`; the caller supplies whatever
/// invariant check identifies "this is still the bug we started from"
/// (e.g. an assertion violation or a specific deadlock signature) — the
/// oracle itself has no opinion on what a violation looks like.
pub struct EngineOracle<'r, R> {
    runtime: &'r mut R,
    config: DporConfig,
}

impl<'r, R: ActorRuntime> EngineOracle<'r, R> {
    pub fn new(runtime: &'r mut R, config: DporConfig) -> Self {
        Self { runtime, config }
    }
}

impl<'r, R, F> Oracle<F> for EngineOracle<'r, R>
where
    R: ActorRuntime,
    F: Fn(&Trace) -> bool,
{
    fn test(&mut self, externals: &[ExternalEvent], guide: Option<&ReplayGuide>, fingerprint: &F) -> Result<Option<Trace>, MinimizerError> {
        self.runtime.restart_system()?;
        let mut engine = DporEngine::new(self.config.clone());
        engine.set_replay_guide(guide.cloned());
        let trace = engine.replay(self.runtime, externals.to_vec())?;
        Ok(if fingerprint(&trace) { Some(trace) } else { None })
    }
}
