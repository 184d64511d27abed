//! Trace persistence (§6 "Trace log"), serde-first like the teacher's
//! `serde_json`-based persistence idiom, with a pluggable payload codec.

use crate::errors::Result;
use crate::event::Unique;
use serde::{Deserialize, Serialize};

/// An ordered sequence of `Unique`s: `CurrentTrace` once a run completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub events: Vec<Unique>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unique: Unique) {
        self.events.push(unique);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sequence of ids in dispatch order, used for replay-divergence checks.
    pub fn id_sequence(&self) -> Vec<u64> {
        self.events.iter().map(|u| u.id).collect()
    }
}

/// Pluggable serialization for a `Trace`, so callers can plug in their own
/// payload codec (§6) while the id/receiver/sender skeleton stays stable.
pub trait TraceSerializer {
    fn serialize(&self, trace: &Trace) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Trace>;
}

/// Default serializer: human-inspectable JSON via `serde_json`, matching
/// the teacher's `serde_json`-first persistence idiom.
#[derive(Default)]
pub struct JsonTraceSerializer;

impl TraceSerializer for JsonTraceSerializer {
    fn serialize(&self, trace: &Trace) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(trace)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Trace> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
