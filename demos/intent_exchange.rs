//! Three nodes on two in-memory media exchanging intents.
//!
//! Alice and Bob share one medium, Bob and Carol another, so Carol only hears
//! Alice through Bob's relay. Run with `RUST_LOG=sacred_mesh=debug` to follow
//! the routing decisions.

use std::sync::Arc;
use std::time::Duration;

use sacred_mesh::{IntentMessage, MemoryHub, MeshKey, SacredMesh, StaticKeys};
use tracing_subscriber::EnvFilter;

fn node(
    id: &str,
    keys: &Arc<StaticKeys>,
    hubs: &[(&MemoryHub, &str)],
) -> sacred_mesh::Result<SacredMesh> {
    let mut builder = SacredMesh::builder(id).keys(Arc::<StaticKeys>::clone(keys));
    for (hub, name) in hubs {
        builder = builder.transport(Arc::new(hub.transport(*name)));
    }
    builder.build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let keys = Arc::new(StaticKeys::new(MeshKey::generate()));
    let west = MemoryHub::new();
    let east = MemoryHub::new();

    let alice = node("alice", &keys, &[(&west, "alice-west")])?;
    let bob = node("bob", &keys, &[(&west, "bob-west"), (&east, "bob-east")])?;
    let carol = node("carol", &keys, &[(&east, "carol-east")])?;

    // Queued before any transport is up, flushed by initialize.
    let message = IntentMessage::new(["harmony", "protection"], 0.8).with_note("stay safe");
    alice.send_message(&message).await?;
    println!("alice queued {} message(s)", alice.status().queued_messages);

    let mut carol_inbox = carol.messages();
    let _bob_log = bob.on_message(|message, sender| {
        println!("bob   <- {sender}: {:?} ({:.2})", message.sigils, message.intent_strength);
    });

    for mesh in [&carol, &bob, &alice] {
        mesh.initialize().await?;
    }

    let (received, sender) = tokio::time::timeout(Duration::from_secs(1), carol_inbox.recv())
        .await?
        .ok_or("carol's inbox closed")?;
    println!(
        "carol <- {sender}: {:?} note={:?} (via bob)",
        received.sigils, received.note
    );

    for mesh in [&alice, &bob, &carol] {
        let metrics = mesh.metrics();
        println!(
            "{:<5} sent={} flushed={} relayed={} delivered={} dropped={}",
            mesh.sender_id(),
            metrics.sent,
            metrics.flushed,
            metrics.relayed,
            metrics.delivered,
            metrics.dropped_total()
        );
    }

    for mesh in [&alice, &bob, &carol] {
        mesh.shutdown().await;
    }
    Ok(())
}
