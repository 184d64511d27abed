//! Clock-cluster minimal-causal-sequence reduction (§4.4).

pub mod cluster;
pub mod oracle;
pub mod wildcard;

pub use cluster::{build_iteration_plan, cluster_trace, Candidate, ClockClusters};
pub use oracle::{build_replay_guide, minimize, EngineOracle, GuideEntry, MinimizationStats, Oracle, ReplayGuide};
pub use wildcard::{
    resolver_for, AmbiguityResolver, BackTrackCandidate, BackTrackStrategy, FirstAndLastBacktrack, LastOnlyStrategy, SrcDstFifoOnly, WildCard,
};
