//! Integration tests exercising the seed scenarios of the component design
//! against an in-memory mock runtime, in the style of `frankenterm`'s
//! `distributed_merge_dpor` integration tests (`ExplorationTestConfig`,
//! `run_exploration_test`).

use knhk_dpor::{DporConfig, DporEngine, Envelope, ExternalEvent, MockRuntime, Payload, SearchStats};
use std::collections::BTreeSet;

struct ExplorationTestConfig {
    config: DporConfig,
    externals: Vec<ExternalEvent>,
}

fn run_exploration_test(test: ExplorationTestConfig, runtime: &mut MockRuntime) -> SearchStats {
    let mut engine = DporEngine::new(test.config);
    engine.search(runtime, test.externals).expect("search should not error")
}

fn send(sender: &str, receiver: &str, kind: &str) -> Envelope {
    Envelope {
        sender: Some(sender.into()),
        receiver: receiver.into(),
        payload: Payload::new(kind, serde_json::json!(null)),
    }
}

#[test]
fn s1_race_reversal_between_two_sibling_sends() {
    let mut runtime = MockRuntime::new();
    runtime.script("A", "go", vec![send("A", "C", "m1"), send("A", "C", "m2")]);

    let stats = run_exploration_test(
        ExplorationTestConfig {
            config: DporConfig::default(),
            externals: vec![
                ExternalEvent::Start { name: "A".into() },
                ExternalEvent::Start { name: "C".into() },
                ExternalEvent::Send { receiver: "A".into(), payload: Payload::new("go", serde_json::json!(null)) },
            ],
        },
        &mut runtime,
    );

    assert_eq!(stats.interleavings, 2, "both orderings of m1/m2 at C must be explored");
    assert_eq!(stats.races_found, 1, "exactly one co-enabled pair exists in the seed trace");
}

#[test]
fn s2_partition_notifications_precede_any_user_message() {
    let mut runtime = MockRuntime::new();
    let mut group_a = BTreeSet::new();
    group_a.insert("A".to_string());
    let mut group_b = BTreeSet::new();
    group_b.insert("B".to_string());

    let stats = run_exploration_test(
        ExplorationTestConfig {
            config: DporConfig::default(),
            externals: vec![
                ExternalEvent::Start { name: "A".into() },
                ExternalEvent::Start { name: "B".into() },
                ExternalEvent::NetworkPartition { group_a, group_b },
                ExternalEvent::Send { receiver: "A".into(), payload: Payload::new("ping-B", serde_json::json!(null)) },
            ],
        },
        &mut runtime,
    );

    let trace = &stats.traces[0];
    let partition_pos = trace
        .events
        .iter()
        .position(|u| matches!(u.event, knhk_dpor::Event::NetworkPartition { .. }))
        .expect("partition must appear in trace");
    let unreachable_positions: Vec<usize> = trace
        .events
        .iter()
        .enumerate()
        .filter(|(_, u)| u.event.as_msg().is_some_and(|m| m.payload.is_nodes_unreachable()))
        .map(|(i, _)| i)
        .collect();
    assert!(unreachable_positions.iter().all(|&p| p > partition_pos));
    let ping_is_absent = !trace
        .events
        .iter()
        .any(|u| u.event.as_msg().is_some_and(|m| m.payload.kind == "ping-B"));
    assert!(ping_is_absent, "the cross-partition ping must be dropped, not delivered");
}

#[test]
fn s3_quiescence_barrier_separates_epochs() {
    let mut runtime = MockRuntime::new();
    let stats = run_exploration_test(
        ExplorationTestConfig {
            config: DporConfig::default(),
            externals: vec![
                ExternalEvent::Start { name: "A".into() },
                ExternalEvent::Send { receiver: "A".into(), payload: Payload::new("x", serde_json::json!(null)) },
                ExternalEvent::WaitQuiescence,
                ExternalEvent::Send { receiver: "A".into(), payload: Payload::new("y", serde_json::json!(null)) },
            ],
        },
        &mut runtime,
    );

    let trace = &stats.traces[0];
    let barrier = trace.events.iter().position(|u| matches!(u.event, knhk_dpor::Event::WaitQuiescence)).unwrap();
    let x = trace.events.iter().position(|u| u.event.as_msg().is_some_and(|m| m.payload.kind == "x")).unwrap();
    let y = trace.events.iter().position(|u| u.event.as_msg().is_some_and(|m| m.payload.kind == "y")).unwrap();
    assert!(x < barrier && barrier < y, "y must fire strictly after the barrier");
}

#[test]
fn s6_duplicate_race_enqueues_backtrack_exactly_once() {
    let mut runtime = MockRuntime::new();
    runtime.script("A", "go", vec![send("A", "C", "m1"), send("A", "C", "m2")]);

    let mut engine = DporEngine::new(DporConfig::default());
    let externals = vec![
        ExternalEvent::Start { name: "A".into() },
        ExternalEvent::Start { name: "C".into() },
        ExternalEvent::Send { receiver: "A".into(), payload: Payload::new("go", serde_json::json!(null)) },
    ];
    let stats = engine.search(&mut runtime, externals).unwrap();
    assert_eq!(stats.races_found, 1);
    assert_eq!(engine.backtrack_len(), 0, "both branches of the one race must be fully explored");
}
