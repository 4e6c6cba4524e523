use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sacred_mesh::transport::Transport;
use sacred_mesh::{
    ConnectionState, Error, IntentMessage, MAX_PACKET_SIZE, ManualClock, MemoryHub,
    MemoryTransport, MeshConfig, MeshKey, Recipient, SacredMesh, StaticKeys, WireEnvelope,
};

const START: u64 = 1_760_000_000;

fn broadcast_key() -> MeshKey {
    MeshKey::from_array([0x5A; 32])
}

fn node(id: &str, transports: &[&MemoryTransport]) -> SacredMesh {
    node_with(id, transports, StaticKeys::new(broadcast_key()), MeshConfig::default(), START)
}

fn node_with(
    id: &str,
    transports: &[&MemoryTransport],
    keys: StaticKeys,
    config: MeshConfig,
    now: u64,
) -> SacredMesh {
    let mut builder = SacredMesh::builder(id)
        .config(config)
        .keys(Arc::new(keys))
        .clock(Arc::new(ManualClock::new(now)));
    for transport in transports {
        builder = builder.transport(Arc::new((*transport).clone()));
    }
    builder.build().expect("valid mesh")
}

fn sample() -> IntentMessage {
    IntentMessage::new(["harmony", "protection"], 0.8)
        .with_note("stay safe")
        .with_ttl(3600)
        .with_hop_limit(5)
}

fn counter(mesh: &SacredMesh) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    mesh.on_message(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    })
    .detach();
    hits
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn fan_out_sends_identical_bytes_on_every_active_transport() {
    let lora = MemoryTransport::detached("lora");
    let webrtc = MemoryTransport::detached("webrtc");
    let alice = node("alice", &[&lora, &webrtc]);
    alice.initialize().await.unwrap();

    let id = alice.send_message(&sample()).await.unwrap();

    let lora_frames = lora.sent_frames();
    assert_eq!(lora_frames.len(), 1);
    assert_eq!(lora_frames, webrtc.sent_frames());
    assert!(lora_frames[0].len() <= MAX_PACKET_SIZE);
    assert_eq!(WireEnvelope::parse(&lora_frames[0]).unwrap().message_id(), &id);
    assert_eq!(alice.metrics().sent, 1);
}

#[tokio::test]
async fn queued_messages_flush_in_order_when_a_transport_comes_up() {
    let lora = MemoryTransport::detached("lora");
    lora.set_refuse_connect(true);
    let alice = node("alice", &[&lora]);
    alice.initialize().await.unwrap();

    let status = alice.status();
    assert!(!status.has_active_transports);
    assert_eq!(status.state, ConnectionState::Disconnected);

    let mut ids = Vec::new();
    for sigil in ["dawn", "noon", "dusk"] {
        ids.push(alice.send_message(&IntentMessage::new([sigil], 0.5)).await.unwrap());
    }
    assert_eq!(alice.status().queued_messages, 3);
    assert!(lora.sent_frames().is_empty());

    lora.set_active(true);
    eventually(|| alice.status().queued_messages == 0).await;

    let sent: Vec<_> = lora
        .sent_frames()
        .iter()
        .map(|frame| *WireEnvelope::parse(frame).unwrap().message_id())
        .collect();
    assert_eq!(sent, ids);
    assert_eq!(alice.status().state, ConnectionState::Connected);
    assert_eq!(alice.metrics().flushed, 3);
}

#[tokio::test]
async fn two_nodes_exchange_over_a_shared_medium() {
    let hub = MemoryHub::new();
    let alice = node("alice", &[&hub.transport("alice-radio")]);
    let bob = node("bob", &[&hub.transport("bob-radio")]);
    alice.initialize().await.unwrap();
    bob.initialize().await.unwrap();

    let mut inbox = bob.messages();
    alice.send_message(&sample()).await.unwrap();

    let (message, sender) = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .expect("delivery in time")
        .expect("stream open");
    assert_eq!(sender, "alice");
    assert_eq!(message.sigils, ["harmony", "protection"]);
    assert_eq!(message.note.as_deref(), Some("stay safe"));
    assert_eq!(message.ttl, 3600);
    assert_eq!(message.hop_limit, 5);
    assert!((message.intent_strength - 0.8).abs() <= f32::EPSILON);

    // Single-medium relay would echo back on the origin transport, so none happens.
    assert_eq!(bob.metrics().relayed, 0);
    assert_eq!(bob.metrics().delivered, 1);
}

#[tokio::test]
async fn relay_bridges_two_media_and_consumes_a_hop() {
    let west = MemoryHub::new();
    let east = MemoryHub::new();
    let bob_east = east.transport("bob-east");

    let alice = node("alice", &[&west.transport("alice")]);
    let bob = node("bob", &[&west.transport("bob-west"), &bob_east]);
    let carol = node("carol", &[&east.transport("carol")]);
    for mesh in [&alice, &bob, &carol] {
        mesh.initialize().await.unwrap();
    }
    let carol_hits = counter(&carol);

    alice.send_message(&sample()).await.unwrap();
    eventually(|| carol_hits.load(Ordering::SeqCst) == 1).await;

    let relayed = bob_east.sent_frames();
    assert_eq!(relayed.len(), 1);
    assert_eq!(WireEnvelope::parse(&relayed[0]).unwrap().hops_remaining(), 4);
    assert_eq!(bob.metrics().relayed, 1);
    assert_eq!(bob.metrics().delivered, 1);
}

#[tokio::test]
async fn zero_hop_limit_delivers_locally_without_relay() {
    let west = MemoryHub::new();
    let east = MemoryHub::new();
    let bob_east = east.transport("bob-east");

    let alice = node("alice", &[&west.transport("alice")]);
    let bob = node("bob", &[&west.transport("bob-west"), &bob_east]);
    alice.initialize().await.unwrap();
    bob.initialize().await.unwrap();
    let bob_hits = counter(&bob);

    alice
        .send_message(&sample().with_hop_limit(0))
        .await
        .unwrap();
    eventually(|| bob_hits.load(Ordering::SeqCst) == 1).await;

    assert!(bob_east.sent_frames().is_empty());
    assert_eq!(bob.metrics().relayed, 0);
}

#[tokio::test]
async fn duplicates_across_transports_are_delivered_once() {
    let lora = MemoryHub::new();
    let ble = MemoryHub::new();
    let alice = node("alice", &[&lora.transport("alice-lora"), &ble.transport("alice-ble")]);
    let bob = node("bob", &[&lora.transport("bob-lora"), &ble.transport("bob-ble")]);
    alice.initialize().await.unwrap();
    bob.initialize().await.unwrap();
    let bob_hits = counter(&bob);

    alice.send_message(&sample()).await.unwrap();
    eventually(|| bob.metrics().dropped_duplicate >= 1).await;

    assert_eq!(bob_hits.load(Ordering::SeqCst), 1);
    assert_eq!(bob.metrics().delivered, 1);
    // Bob's relay reaches Alice, who recognizes her own message.
    eventually(|| alice.metrics().dropped_own >= 1).await;
}

#[tokio::test]
async fn expired_message_is_neither_delivered_nor_relayed() {
    let hub = MemoryHub::new();
    let bob_radio = hub.transport("bob-radio");
    let alice = node("alice", &[&hub.transport("alice-radio")]);
    let bob = node_with(
        "bob",
        &[&bob_radio],
        StaticKeys::new(broadcast_key()),
        MeshConfig::default(),
        START + 2,
    );
    alice.initialize().await.unwrap();
    bob.initialize().await.unwrap();
    let bob_hits = counter(&bob);

    alice.send_message(&sample().with_ttl(1)).await.unwrap();
    eventually(|| bob.metrics().dropped_expired == 1).await;

    assert_eq!(bob_hits.load(Ordering::SeqCst), 0);
    assert!(bob_radio.sent_frames().is_empty());
}

#[tokio::test]
async fn tampered_frames_are_dropped() {
    let alice_radio = MemoryTransport::detached("alice-radio");
    let bob_radio = MemoryTransport::detached("bob-radio");
    let alice = node("alice", &[&alice_radio]);
    let bob = node("bob", &[&bob_radio]);
    alice.initialize().await.unwrap();
    bob.initialize().await.unwrap();
    let bob_hits = counter(&bob);

    alice.send_message(&sample()).await.unwrap();
    let frame = alice_radio.sent_frames()[0].to_vec();

    let mut bad_tag = frame.clone();
    let last = bad_tag.len() - 1;
    bad_tag[last] ^= 0x01;
    bob_radio.inject(bad_tag).unwrap();

    // The nonce and authTag entries take the last 57 bytes of the frame.
    let mut bad_ciphertext = frame.clone();
    let inside_payload = frame.len() - 57 - 1;
    bad_ciphertext[inside_payload] ^= 0x80;
    bob_radio.inject(bad_ciphertext).unwrap();

    eventually(|| bob.metrics().dropped_unauthenticated == 2).await;
    assert_eq!(bob_hits.load(Ordering::SeqCst), 0);

    // The untouched frame still goes through afterwards.
    bob_radio.inject(frame).unwrap();
    eventually(|| bob_hits.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn peer_and_circle_addressing() {
    let hub = MemoryHub::new();
    let pair = MeshKey::from_array([0x11; 32]);
    let circle = MeshKey::from_array([0x22; 32]);

    let alice = node_with(
        "alice",
        &[&hub.transport("alice")],
        StaticKeys::new(broadcast_key())
            .with_peer("bob", pair.clone())
            .with_circle("dawn", circle.clone()),
        MeshConfig::default(),
        START,
    );
    let bob = node_with(
        "bob",
        &[&hub.transport("bob")],
        StaticKeys::new(broadcast_key())
            .with_peer("alice", pair)
            .with_circle("dawn", circle),
        MeshConfig {
            circles: vec!["dawn".into()],
            ..MeshConfig::default()
        },
        START,
    );
    let carol = node("carol", &[&hub.transport("carol")]);
    for mesh in [&alice, &bob, &carol] {
        mesh.initialize().await.unwrap();
    }
    let bob_hits = counter(&bob);
    let carol_hits = counter(&carol);

    alice
        .send_to(&sample(), Recipient::Peer("bob".into()))
        .await
        .unwrap();
    alice
        .send_to(&sample(), Recipient::Circle("dawn".into()))
        .await
        .unwrap();

    eventually(|| bob_hits.load(Ordering::SeqCst) == 2).await;
    eventually(|| carol.metrics().dropped_unauthenticated == 2).await;
    assert_eq!(carol_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn losing_one_transport_degrades_gracefully() {
    let lora = MemoryTransport::detached("lora");
    let ble = MemoryTransport::detached("ble");
    let alice = node("alice", &[&lora, &ble]);
    alice.initialize().await.unwrap();

    lora.set_active(false);
    alice.send_message(&sample()).await.unwrap();
    assert!(lora.sent_frames().is_empty());
    assert_eq!(ble.sent_frames().len(), 1);
    assert_eq!(alice.status().transports.get("lora"), Some(&false));

    ble.set_active(false);
    eventually(|| alice.status().state == ConnectionState::Disconnected).await;
    alice.send_message(&sample()).await.unwrap();
    let status = alice.status();
    assert!(!status.is_connected);
    assert_eq!(status.queued_messages, 1);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn failed_initialization_is_reported_in_status() {
    let lora = MemoryTransport::detached("lora");
    let webrtc = MemoryTransport::detached("webrtc");
    lora.set_refuse_connect(true);
    webrtc.set_refuse_connect(true);
    let alice = node("alice", &[&lora, &webrtc]);
    alice.initialize().await.unwrap();

    let status = alice.status();
    let error = status.error.expect("initialization error");
    assert!(error.contains("lora"));
    assert!(error.contains("webrtc"));
    assert!(!status.is_connected);
    assert_eq!(status.transports.len(), 2);

    // Sends still succeed; they wait in the queue.
    alice.send_message(&sample()).await.unwrap();
    assert_eq!(alice.status().queued_messages, 1);
}

#[tokio::test]
async fn oversized_message_is_rejected_before_transmission() {
    let lora = MemoryTransport::detached("lora");
    let alice = node("alice", &[&lora]);
    alice.initialize().await.unwrap();

    let message = IntentMessage::new(
        ["harmony", "protection", "gratitude", "abundance", "clarity"],
        1.0,
    )
    .with_note("n".repeat(96));
    assert!(matches!(
        alice.send_message(&message).await,
        Err(Error::PayloadTooLarge { .. })
    ));
    assert!(lora.sent_frames().is_empty());
    assert_eq!(alice.status().queued_messages, 0);
}

#[tokio::test]
async fn shutdown_closes_the_mesh() {
    let lora = MemoryTransport::detached("lora");
    let alice = node("alice", &[&lora]);
    alice.initialize().await.unwrap();

    alice.shutdown().await;

    assert_eq!(alice.status().state, ConnectionState::Closed);
    assert!(!lora.is_active());
    assert!(matches!(alice.send_message(&sample()).await, Err(Error::Closed)));
    assert!(matches!(
        alice
            .add_transport(Arc::new(MemoryTransport::detached("late")))
            .await,
        Err(Error::Closed)
    ));
}
