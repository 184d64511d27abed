//! Event model and stable identities (§3 `Event`, `Unique`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name of an actor, used as both a lane key and a partition-map key.
pub type ActorName = String;

/// A message payload. Equality ignores a timer marker's transient token,
/// per the special sibling-matching rule in §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    /// Application-level message tag (e.g. "Ping", "NodesUnreachable").
    pub kind: String,
    /// Structural body used for equality between sends.
    pub body: serde_json::Value,
    /// Set when this payload is a timer firing/scheduling marker.
    pub timer: Option<TimerMarker>,
    /// Application-level logical clock value, if the protocol carries one.
    pub logical_clock: Option<u64>,
    /// Timer ticks and similar events that advance a logical clock without
    /// themselves carrying one still need to be flagged for the minimizer.
    pub causes_clock_increment: bool,
}

impl Payload {
    pub fn new(kind: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            body,
            timer: None,
            logical_clock: None,
            causes_clock_increment: false,
        }
    }

    pub fn with_clock(mut self, clock: u64) -> Self {
        self.logical_clock = Some(clock);
        self
    }

    pub fn with_timer(mut self, marker: TimerMarker) -> Self {
        self.causes_clock_increment = true;
        self.timer = Some(marker);
        self
    }

    /// The marker payload used for decomposed partition notifications.
    pub fn nodes_unreachable(unreachable: &ActorName) -> Self {
        Self::new(
            NODES_UNREACHABLE_KIND,
            serde_json::json!({ "unreachable": unreachable }),
        )
    }

    pub fn is_nodes_unreachable(&self) -> bool {
        self.kind == NODES_UNREACHABLE_KIND
    }

    pub fn is_timer_marker(&self) -> bool {
        self.timer.is_some()
    }
}

pub const NODES_UNREACHABLE_KIND: &str = "__NodesUnreachable";

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (&self.timer, &other.timer) {
            (Some(a), Some(b)) => self.kind == other.kind && a.matches(b),
            (None, None) => self.kind == other.kind && self.body == other.body,
            _ => false,
        }
    }
}
impl Eq for Payload {}

/// A timer marker: matches a sibling by `(timer_name, inner_msg, repeating)`
/// only, ignoring the transient `token` (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerMarker {
    pub timer_name: String,
    pub inner_msg: serde_json::Value,
    pub repeating: bool,
    pub token: u64,
}

impl TimerMarker {
    fn matches(&self, other: &Self) -> bool {
        self.timer_name == other.timer_name
            && self.inner_msg == other.inner_msg
            && self.repeating == other.repeating
    }
}

/// A single message delivery: `sender -> receiver` carrying `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgEvent {
    pub sender: Option<ActorName>,
    pub receiver: ActorName,
    pub payload: Payload,
}

/// Sibling matching (§4.2) is on `(receiver, payload)` only: `sender` is
/// resolution metadata, not part of a message's logical identity, so two
/// sends that differ only in which sender-resolution path produced them
/// must still be recognized as the same sibling.
impl PartialEq for MsgEvent {
    fn eq(&self, other: &Self) -> bool {
        self.receiver == other.receiver && self.payload == other.payload
    }
}
impl Eq for MsgEvent {}

/// The tagged event variants of §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Msg(MsgEvent),
    NetworkPartition {
        group_a: BTreeSet<ActorName>,
        group_b: BTreeSet<ActorName>,
    },
    WaitQuiescence,
    Spawn {
        name: ActorName,
    },
    /// Sentinel root of the dependency graph; always has id 0.
    Root,
}

impl Event {
    pub fn as_msg(&self) -> Option<&MsgEvent> {
        match self {
            Event::Msg(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_msg(&self) -> bool {
        matches!(self, Event::Msg(_))
    }
}

/// `(Event, id)`: a stable identity for a logical delivery across runs.
///
/// `id == 0` marks system/noise events filtered out of trace consultation;
/// two `MsgEvent`s with `id == 0` are considered equal iff their receivers
/// match (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unique {
    pub event: Event,
    pub id: u64,
}

impl Unique {
    pub fn root() -> Self {
        Unique {
            event: Event::Root,
            id: 0,
        }
    }

    pub fn is_noise(&self) -> bool {
        matches!(&self.event, Event::Spawn { .. }) || (self.id == 0 && self.event.is_msg())
    }
}

impl PartialEq for Unique {
    fn eq(&self, other: &Self) -> bool {
        if self.id == 0 && other.id == 0 {
            if let (Event::Msg(a), Event::Msg(b)) = (&self.event, &other.event) {
                return a.receiver == b.receiver;
            }
        }
        self.id == other.id && self.event == other.event
    }
}
impl Eq for Unique {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_id_msg_events_compare_by_receiver_only() {
        let a = Unique {
            event: Event::Msg(MsgEvent {
                sender: None,
                receiver: "A".into(),
                payload: Payload::new("x", serde_json::json!(1)),
            }),
            id: 0,
        };
        let b = Unique {
            event: Event::Msg(MsgEvent {
                sender: Some("Z".into()),
                receiver: "A".into(),
                payload: Payload::new("y", serde_json::json!(2)),
            }),
            id: 0,
        };
        assert_eq!(a, b);
    }

    #[test]
    fn timer_marker_ignores_token() {
        let make = |token| {
            Payload::new("Timer", serde_json::json!(null)).with_timer(TimerMarker {
                timer_name: "tick".into(),
                inner_msg: serde_json::json!({"n": 1}),
                repeating: false,
                token,
            })
        };
        assert_eq!(make(1), make(2));
    }
}
