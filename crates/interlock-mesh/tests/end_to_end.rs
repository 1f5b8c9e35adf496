//! Two real mesh sockets exchanging signals over loopback UDP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use interlock_mesh::{MeshConfig, MeshSocket, PeerSeed, PeerStatus};

async fn bind_node(name: &str, accepted: &[&str], peers: Vec<PeerSeed>) -> MeshSocket {
    MeshSocket::bind(MeshConfig {
        name: name.to_string(),
        bind: "127.0.0.1:0".to_string(),
        peers,
        accepted_signals: accepted.iter().map(|s| s.to_string()).collect(),
        // Long enough that the liveness scan never fires during the test.
        heartbeat_interval: Duration::from_secs(30),
        heartbeat_timeout: Duration::from_secs(90),
        ..MeshConfig::default()
    })
    .await
    .expect("bind should succeed")
}

/// Waits until `check` passes or the deadline expires.
async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(check(), "condition not reached within deadline");
}

#[tokio::test]
async fn whitelist_drops_unlisted_kind_and_admits_listed_kind() {
    let node_a = bind_node("node-a", &["0x01", "0x04"], Vec::new()).await;
    let a_addr = node_a.local_addr().unwrap();

    let node_b = bind_node(
        "node-b",
        &[],
        vec![PeerSeed {
            name: "node-a".to_string(),
            host: "127.0.0.1".to_string(),
            port: a_addr.port(),
        }],
    )
    .await;

    let status_hits = Arc::new(AtomicUsize::new(0));
    {
        let status_hits = Arc::clone(&status_hits);
        node_a.on_signal(
            0x04,
            Arc::new(move |signal, _| {
                assert_eq!(signal.sender, "node-b");
                status_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }

    // B's dock announcement (kind 0x01) is on A's whitelist; wait for the
    // implicit discovery before asserting on the blocked path.
    {
        let node_a = &node_a;
        eventually(|| node_a.peers().iter().any(|p| p.name == "node-b")).await;
    }

    // Unlisted kind: dropped by the tumbler, no handler fires.
    let blocked_before = node_a.tumbler_snapshot().blocked;
    node_b.emit(0x02, json!({"probe": true}), None).await;
    {
        let node_a = &node_a;
        eventually(|| node_a.tumbler_snapshot().blocked > blocked_before).await;
    }
    assert_eq!(status_hits.load(Ordering::SeqCst), 0);

    // Listed kind: admitted, handler fires once, peer table refreshed.
    let received_before = node_a.stats().received;
    node_b.emit(0x04, json!({"report": "ok"}), None).await;
    {
        let status_hits = &status_hits;
        eventually(|| status_hits.load(Ordering::SeqCst) == 1).await;
    }
    assert!(node_a.stats().received > received_before);

    let peers = node_a.peers();
    let peer_b = peers.iter().find(|p| p.name == "node-b").unwrap();
    assert_eq!(peer_b.status, PeerStatus::Active);
    assert!(peer_b.last_seen_ms > 0);

    node_b.stop().await;
    node_a.stop().await;
}

#[tokio::test]
async fn heartbeats_keep_peers_active_and_silence_downgrades_them() {
    let node_a = MeshSocket::bind(MeshConfig {
        name: "node-a".to_string(),
        bind: "127.0.0.1:0".to_string(),
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(150),
        ..MeshConfig::default()
    })
    .await
    .expect("bind should succeed");
    let a_addr = node_a.local_addr().unwrap();

    let node_b = bind_node(
        "node-b",
        &[],
        vec![PeerSeed {
            name: "node-a".to_string(),
            host: "127.0.0.1".to_string(),
            port: a_addr.port(),
        }],
    )
    .await;
    let mut peer_events = node_a.peer_events();

    // B docks once and then stays silent; A discovers it from that signal.
    {
        let node_a = &node_a;
        eventually(|| node_a.peers().iter().any(|p| p.name == "node-b")).await;
    }

    // After the timeout with no further traffic, A's liveness scan flips B.
    {
        let node_a = &node_a;
        eventually(|| {
            node_a
                .peers()
                .iter()
                .any(|p| p.name == "node-b" && p.status == PeerStatus::Inactive)
        })
        .await;
    }
    let mut saw_inactive = false;
    while let Ok(event) = peer_events.try_recv() {
        if matches!(&event, interlock_mesh::PeerEvent::Inactive { name } if name == "node-b") {
            saw_inactive = true;
        }
    }
    assert!(saw_inactive, "expected a peer_inactive notification");

    // Any new accepted signal recovers the peer.
    node_b.emit(0x05, json!({"back": true}), None).await;
    {
        let node_a = &node_a;
        eventually(|| {
            node_a
                .peers()
                .iter()
                .any(|p| p.name == "node-b" && p.status == PeerStatus::Active)
        })
        .await;
    }

    node_b.stop().await;
    node_a.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocked_handler_does_not_stall_datagram_intake() {
    let node_a = bind_node("node-a", &[], Vec::new()).await;
    let a_addr = node_a.local_addr().unwrap();

    // A handler that parks until the test releases it, standing in for a
    // consumer stuck on slow downstream work.
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let gate_rx = std::sync::Mutex::new(gate_rx);
    let gate_entered = Arc::new(AtomicUsize::new(0));
    {
        let gate_entered = Arc::clone(&gate_entered);
        node_a.on_signal(
            0x05,
            Arc::new(move |_, _| {
                gate_entered.fetch_add(1, Ordering::SeqCst);
                let _ = gate_rx.lock().unwrap().recv();
                Ok(())
            }),
        );
    }
    let status_hits = Arc::new(AtomicUsize::new(0));
    {
        let status_hits = Arc::clone(&status_hits);
        node_a.on_signal(
            0x04,
            Arc::new(move |_, _| {
                status_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
    }

    let node_b = bind_node(
        "node-b",
        &[],
        vec![PeerSeed {
            name: "node-a".to_string(),
            host: "127.0.0.1".to_string(),
            port: a_addr.port(),
        }],
    )
    .await;

    node_b.emit(0x05, json!({"work": "slow"}), None).await;
    {
        let gate_entered = &gate_entered;
        eventually(|| gate_entered.load(Ordering::SeqCst) == 1).await;
    }

    // With the 0x05 handler parked, further datagrams must still be
    // received and admitted (dock + 0x05 + 0x04 = 3).
    node_b.emit(0x04, json!({"report": "ok"}), None).await;
    {
        let node_a = &node_a;
        eventually(|| node_a.stats().received >= 3).await;
    }
    assert_eq!(status_hits.load(Ordering::SeqCst), 0, "dispatch still gated");

    // Releasing the gate drains the queue in arrival order.
    gate_tx.send(()).unwrap();
    {
        let status_hits = &status_hits;
        eventually(|| status_hits.load(Ordering::SeqCst) == 1).await;
    }

    node_b.stop().await;
    node_a.stop().await;
}

#[tokio::test]
async fn foreign_datagrams_only_bump_the_drop_counter() {
    let node = bind_node("node-a", &[], Vec::new()).await;
    let addr = node.local_addr().unwrap();

    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    probe.send_to(b"SSDP NOTIFY * HTTP/1.1\r\n", addr).await.unwrap();
    probe.send_to(&[0u8; 5], addr).await.unwrap();

    {
        let node = &node;
        eventually(|| node.stats().dropped_decode == 2).await;
    }
    assert_eq!(node.stats().received, 0);
    assert!(node.peers().is_empty());

    node.stop().await;
}
