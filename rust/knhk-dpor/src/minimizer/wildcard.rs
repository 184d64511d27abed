//! Wildcard matching and ambiguity-resolution strategies (§4.4).
//!
//! When a clock cluster keeps a message in the trace, the replay guide no
//! longer knows its exact id (the cluster above or below it may have been
//! dropped) — only its receiver and, for timers, that it advances a clock.
//! A [`WildCard`] captures that relaxed predicate; an [`AmbiguityResolver`]
//! picks which pending delivery satisfies it when more than one does.

use crate::event::ActorName;
use crate::pending::PendingDelivery;

/// A relaxed match predicate standing in for a dropped exact id.
#[derive(Debug, Clone)]
pub enum WildCard {
    /// Match any pending delivery to `receiver`.
    AnyTo { receiver: ActorName },
    /// Timers bypass the ambiguity strategies entirely: match any pending
    /// delivery whose payload advances a logical clock (§4.4).
    AnyClockIncrement,
}

impl WildCard {
    fn matches(&self, pd: &PendingDelivery) -> bool {
        match self {
            WildCard::AnyTo { receiver } => pd.envelope.receiver == *receiver,
            WildCard::AnyClockIncrement => pd.envelope.payload.causes_clock_increment,
        }
    }
}

/// A deferred alternative match, registered as a backtrack candidate for
/// DPOR to retry once the first match has been exhausted (§4.4).
#[derive(Debug, Clone)]
pub struct BacktrackCandidate {
    pub index: usize,
}

/// Picks which pending delivery (if any) satisfies a [`WildCard`], and
/// which alternative matches should become backtrack candidates.
pub trait AmbiguityResolver {
    fn resolve(&self, wildcard: &WildCard, pending: &[PendingDelivery]) -> Option<(usize, Vec<BacktrackCandidate>)>;
}

fn matching_indices(wildcard: &WildCard, pending: &[PendingDelivery]) -> Vec<usize> {
    pending
        .iter()
        .enumerate()
        .filter(|(_, pd)| wildcard.matches(pd))
        .map(|(i, _)| i)
        .collect()
}

/// Structural identity of a pending delivery for backtrack-candidate
/// dedup (§4.4): same receiver and same payload kind/body means replaying
/// that alternative would reach the same state as one already registered,
/// so only the first occurrence of each fingerprint is worth a candidate.
fn fingerprint(pd: &PendingDelivery) -> (ActorName, String, String) {
    (
        pd.envelope.receiver.clone(),
        pd.envelope.payload.kind.clone(),
        pd.envelope.payload.body.to_string(),
    )
}

/// Indices from `rest` with a fingerprint distinct from `first` and from
/// each other, keeping the first occurrence of each (S5: "A, A' have the
/// same fingerprint … enqueue backtrack for A'' only, not A'").
fn dedup_by_fingerprint(first: usize, rest: &[usize], pending: &[PendingDelivery]) -> Vec<usize> {
    let mut seen = std::collections::HashSet::new();
    seen.insert(fingerprint(&pending[first]));
    let mut deduped = Vec::new();
    for &index in rest {
        if seen.insert(fingerprint(&pending[index])) {
            deduped.push(index);
        }
    }
    deduped
}

/// Match only if the head of the pending queue satisfies the predicate.
pub struct SrcDstFifoOnly;

impl AmbiguityResolver for SrcDstFifoOnly {
    fn resolve(&self, wildcard: &WildCard, pending: &[PendingDelivery]) -> Option<(usize, Vec<BacktrackCandidate>)> {
        let head = pending.first()?;
        if wildcard.matches(head) {
            Some((0, Vec::new()))
        } else {
            None
        }
    }
}

/// Match the first matching message; register every later *structurally
/// distinct* match, in reversed order, as a backtrack candidate. Later
/// matches that share a fingerprint with an earlier one are redundant
/// alternatives and are dropped (§4.4, worked example S5).
pub struct BackTrackStrategy;

impl AmbiguityResolver for BackTrackStrategy {
    fn resolve(&self, wildcard: &WildCard, pending: &[PendingDelivery]) -> Option<(usize, Vec<BacktrackCandidate>)> {
        let indices = matching_indices(wildcard, pending);
        let (&first, rest) = indices.split_first()?;
        let candidates = dedup_by_fingerprint(first, rest, pending)
            .into_iter()
            .rev()
            .map(|index| BacktrackCandidate { index })
            .collect();
        Some((first, candidates))
    }
}

/// As [`BackTrackStrategy`], but only the last distinct match becomes a
/// backtrack candidate.
pub struct FirstAndLastBacktrack;

impl AmbiguityResolver for FirstAndLastBacktrack {
    fn resolve(&self, wildcard: &WildCard, pending: &[PendingDelivery]) -> Option<(usize, Vec<BacktrackCandidate>)> {
        let indices = matching_indices(wildcard, pending);
        let (&first, rest) = indices.split_first()?;
        let candidates = rest
            .last()
            .map(|&index| vec![BacktrackCandidate { index }])
            .unwrap_or_default();
        Some((first, candidates))
    }
}

/// Match only the last matching pending message.
pub struct LastOnlyStrategy;

impl AmbiguityResolver for LastOnlyStrategy {
    fn resolve(&self, wildcard: &WildCard, pending: &[PendingDelivery]) -> Option<(usize, Vec<BacktrackCandidate>)> {
        let indices = matching_indices(wildcard, pending);
        let last = *indices.last()?;
        Some((last, Vec::new()))
    }
}

/// Map a configured [`crate::config::AmbiguityStrategyKind`] to its
/// [`AmbiguityResolver`], used by [`crate::scheduler::DporEngine`] to drive
/// a wildcard-guided replay (§4.4).
pub fn resolver_for(kind: crate::config::AmbiguityStrategyKind) -> Box<dyn AmbiguityResolver> {
    use crate::config::AmbiguityStrategyKind;
    match kind {
        AmbiguityStrategyKind::SrcDstFifoOnly => Box::new(SrcDstFifoOnly),
        AmbiguityStrategyKind::BackTrack => Box::new(BackTrackStrategy),
        AmbiguityStrategyKind::FirstAndLastBacktrack => Box::new(FirstAndLastBacktrack),
        AmbiguityStrategyKind::LastOnly => Box::new(LastOnlyStrategy),
    }
}
