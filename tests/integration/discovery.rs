use crate::*;

use std::net::UdpSocket as StdUdpSocket;

use murmur_core::message::Announcement;
use murmur_core::{NodeId, UdpMessage, Wire};

fn foreign_announcement(id: &str) -> Announcement {
    Announcement {
        id: NodeId::from(id),
        name: "stranger".into(),
        udp_address: "127.0.0.1".into(),
        udp_port: 9,
        tcp_address: "127.0.0.1".into(),
        tcp_port: 9,
    }
}

/// Two nodes seeded with each other verify within a few discovery cycles.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_seeded_nodes_discover_each_other() {
    let (a, b) = start_pair(|_| {}).unwrap();
    assert!(wait_until(CONVERGE, || verified_each_other(&a, &b)).await);

    // The id tie-break leaves exactly one connection per side, and later
    // discovery rounds do not replace it.
    let conn_a = a.verified_peers()[0].conn_id;
    let conn_b = b.verified_peers()[0].conn_id;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(verified_each_other(&a, &b));
    assert_eq!(a.verified_peers()[0].conn_id, conn_a);
    assert_eq!(b.verified_peers()[0].conn_id, conn_b);
    assert!(a.pending_peers().is_empty());
    assert!(b.pending_peers().is_empty());
}

/// Several nodes on one host sharing the well-known discovery port find
/// each other through broadcast alone. Unicast to the shared port reaches a
/// single socket, so this only converges when pongs are broadcast too.
#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nodes_sharing_discovery_port_all_connect() {
    let port = free_udp_ports(1).unwrap()[0];
    let shared = || NetworkConfig {
        bind_address: Ipv4Addr::UNSPECIFIED,
        broadcast: true,
        broadcast_address: Ipv4Addr::new(127, 255, 255, 255),
        ..NetworkConfig::loopback(port)
    };

    let nodes = ["a", "b", "c"]
        .into_iter()
        .map(|name| Node::start(&Handle::current(), name, shared()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    for node in &nodes {
        assert_eq!(node.local_endpoints().udp.port(), port);
    }

    let all_connected = || nodes.iter().all(|n| n.verified_peers().len() == 2);
    assert!(
        wait_until(CONVERGE, all_connected).await,
        "verified counts: {:?}",
        nodes.iter().map(|n| n.verified_peers().len()).collect::<Vec<_>>()
    );
    for node in &nodes {
        assert!(node.verified_peers().iter().all(|p| p.id != *node.id()));
        assert!(node.pending_peers().is_empty());
    }
}

/// A node whose only seed is itself never connects to itself.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_own_announcements_are_ignored() {
    let port = free_udp_ports(1).unwrap()[0];
    let mut config = NetworkConfig::loopback(port);
    config.seed_peers = vec![loopback(port)];
    let node = Node::start(&Handle::current(), "loner", config).unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(node.verified_peers().is_empty());
    assert!(node.pending_peers().is_empty());
}

/// Without broadcast or seeds a node sends nothing and finds nobody.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unseeded_node_stays_alone() {
    let (a, b) = start_pair(|c| c.seed_peers.clear()).unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(a.verified_peers().is_empty());
    assert!(b.verified_peers().is_empty());
}

/// Without broadcast, a ping is answered with a pong to its source; garbage and
/// unknown tags are dropped without affecting the listener.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_gets_pong_at_source() {
    let port = free_udp_ports(1).unwrap()[0];
    let node = Node::start(&Handle::current(), "target", NetworkConfig::loopback(port)).unwrap();

    let client = StdUdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    let target = loopback(port);

    client.send_to(&[0xff, 0xff, 0xff, 0xff, 1, 2], target).unwrap();
    let unknown = UdpMessage::Unknown("udp_hello".into()).to_bytes().unwrap();
    client.send_to(&unknown, target).unwrap();

    let ping = UdpMessage::Ping(foreign_announcement("0000")).to_bytes().unwrap();
    client.send_to(&ping, target).unwrap();

    // Blocking read off the runtime's worker threads.
    let reply = tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; 2048];
        let (len, from) = client.recv_from(&mut buf)?;
        buf.truncate(len);
        Ok::<_, std::io::Error>((buf, from))
    })
    .await
    .unwrap()
    .expect("node should answer the ping");

    let (buf, from) = reply;
    assert_eq!(from.port(), port);
    match UdpMessage::from_slice(&buf).unwrap() {
        UdpMessage::Pong(a) => {
            assert_eq!(a.id, *node.id());
            assert_eq!(a.name, "target");
            assert_eq!(a.tcp_port, node.local_endpoints().tcp.port());
        }
        other => panic!("expected pong, got {other:?}"),
    }

    // Pings alone never trigger a dial.
    assert!(node.pending_peers().is_empty());
}

/// When a peer goes away, the survivor drops it from the verified map.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_peer_shutdown_is_noticed() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    b.shutdown();
    assert!(wait_until(CONVERGE, || a.verified_peers().is_empty()).await);
    drop(b);
}

/// A peer that restarts with a new identity is discovered again.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restarted_peer_is_rediscovered() {
    let ports = free_udp_ports(2).unwrap();
    let seeded = |own: u16, other: u16| {
        let mut c = NetworkConfig::loopback(own);
        c.seed_peers = vec![loopback(other)];
        c
    };

    let a = Node::start(&Handle::current(), "a", seeded(ports[0], ports[1])).unwrap();
    let b = Node::start(&Handle::current(), "b", seeded(ports[1], ports[0])).unwrap();
    assert!(wait_until(CONVERGE, || verified_each_other(&a, &b)).await);

    let old_id = b.id().clone();
    drop(b);
    assert!(wait_until(CONVERGE, || a.verified_peers().is_empty()).await);

    // Let the old tasks release the port before rebinding it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let b = Node::start(&Handle::current(), "b", seeded(ports[1], ports[0])).unwrap();
    assert_ne!(*b.id(), old_id);
    assert!(wait_until(CONVERGE, || verified_each_other(&a, &b)).await);
}
