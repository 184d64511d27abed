//! The `ActorRuntime` contract (§6) plus a deterministic in-memory
//! `MockRuntime` used by tests and the `demos/` example.
//!
//! This module is intentionally thin: the instrumented actor runtime proper
//! stays an external concern (§6); this is only the seam the engine's tests
//! need to exist at all, in the spirit of `knhk-byzantine`'s test doubles.

use crate::errors::Result;
use crate::event::{ActorName, Payload};
use crate::pending::{Cell, Envelope};
use std::collections::VecDeque;

/// External events accepted by `DporEngine::run` (§6).
#[derive(Debug, Clone)]
pub enum ExternalEvent {
    Start { name: ActorName },
    Send { receiver: ActorName, payload: Payload },
    NetworkPartition {
        group_a: std::collections::BTreeSet<ActorName>,
        group_b: std::collections::BTreeSet<ActorName>,
    },
    WaitQuiescence,
}

/// The contract the driver expects from an instrumented actor runtime (§6).
///
/// `dispatch_new_message` delivers exactly one envelope and returns whatever
/// sends the recipient produced in response, synchronously: per §9's
/// "cooperative suspension" design note, no coroutine machinery is required,
/// so callback-driven delivery is modeled as a plain return value instead.
pub trait ActorRuntime {
    /// Spawn an actor under `name`. Implementations observed only; never
    /// scheduled by the engine itself.
    fn actor_of(&mut self, name: &ActorName) -> Result<()>;

    /// Deliver `envelope` to `cell` and return every send it produced while
    /// handling the delivery.
    fn dispatch_new_message(&mut self, cell: &Cell, envelope: &Envelope) -> Result<Vec<Envelope>>;

    /// Tear down and respawn every actor for a fresh interleaving.
    fn restart_system(&mut self) -> Result<()>;

    /// True iff no actor has pending work (§5 quiescence contract).
    fn is_quiescent(&self) -> bool;
}

/// A deterministic, in-process `ActorRuntime` for tests and demos.
///
/// Actors are opaque: `MockRuntime` does not run user code, it only records
/// deliveries and replays a scripted response table keyed by `(actor, kind)`,
/// which is enough to drive the seed scenarios of §8.
#[derive(Default)]
pub struct MockRuntime {
    spawned: Vec<ActorName>,
    /// Scripted reactions: receiving `(actor, kind)` produces these sends.
    script: std::collections::HashMap<(ActorName, String), Vec<Envelope>>,
    in_flight: VecDeque<Envelope>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that actor `name` receiving a payload of kind `kind`
    /// produces `reaction` (evaluated once, consumed on first match).
    pub fn script(&mut self, name: &str, kind: &str, reaction: Vec<Envelope>) {
        self.script.insert((name.to_string(), kind.to_string()), reaction);
    }

    pub fn spawned(&self) -> &[ActorName] {
        &self.spawned
    }
}

impl ActorRuntime for MockRuntime {
    fn actor_of(&mut self, name: &ActorName) -> Result<()> {
        self.spawned.push(name.clone());
        Ok(())
    }

    fn dispatch_new_message(&mut self, cell: &Cell, envelope: &Envelope) -> Result<Vec<Envelope>> {
        tracing::trace!(actor = %cell.0, kind = %envelope.payload.kind, "mock dispatch");
        let key = (cell.0.clone(), envelope.payload.kind.clone());
        Ok(self.script.remove(&key).unwrap_or_default())
    }

    fn restart_system(&mut self) -> Result<()> {
        self.spawned.clear();
        self.in_flight.clear();
        Ok(())
    }

    fn is_quiescent(&self) -> bool {
        self.in_flight.is_empty()
    }
}
