//! Runs the full DPOR search over a 3-actor race (seed scenario S1) and
//! prints one line per interleaving explored.

use knhk_dpor::{DporConfig, DporEngine, Envelope, ExternalEvent, MockRuntime, Payload};

fn send(sender: &str, receiver: &str, kind: &str) -> Envelope {
    Envelope {
        sender: Some(sender.into()),
        receiver: receiver.into(),
        payload: Payload::new(kind, serde_json::json!(null)),
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut runtime = MockRuntime::new();
    runtime.script("A", "go", vec![send("A", "C", "m1"), send("A", "C", "m2")]);

    let mut engine = DporEngine::new(DporConfig::default());
    let externals = vec![
        ExternalEvent::Start { name: "A".into() },
        ExternalEvent::Start { name: "C".into() },
        ExternalEvent::Send { receiver: "A".into(), payload: Payload::new("go", serde_json::json!(null)) },
    ];

    let stats = engine.search(&mut runtime, externals).expect("search failed");
    tracing::info!(interleavings = stats.interleavings, races_found = stats.races_found, "search complete");
    for (i, trace) in stats.traces.iter().enumerate() {
        println!("interleaving {i}: {} deliveries", trace.len());
    }
}
