//! Murmur integration test harness.
//!
//! Tests run their nodes in-process on loopback. Most disable broadcast and
//! let nodes find each other through seed peers pointing at one another's
//! discovery port; the shared-port discovery test broadcasts on
//! 127.255.255.255 instead. No test needs a LAN.
//!
//!   cargo test --test integration

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::runtime::Handle;

pub use murmur_core::config::NetworkConfig;
pub use murmur_node::{Node, NodeError, Scope};

mod discovery;
mod routing;
mod subscriptions;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long discovery plus handshake may take on loopback.
pub const CONVERGE: Duration = Duration::from_secs(5);

/// Reserve `n` distinct free UDP ports on loopback.
///
/// The sockets are closed before returning, so another process could in
/// principle take a port before the node binds it.
pub fn free_udp_ports(n: usize) -> Result<Vec<u16>> {
    let sockets = (0..n)
        .map(|_| UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)))
        .collect::<std::io::Result<Vec<_>>>()
        .context("failed to reserve udp port")?;
    sockets
        .iter()
        .map(|s| -> Result<u16> { Ok(s.local_addr()?.port()) })
        .collect()
}

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Start two nodes that discover each other through seed peers.
/// `tweak` adjusts both configs before start.
pub fn start_pair(tweak: impl Fn(&mut NetworkConfig)) -> Result<(Node, Node)> {
    let ports = free_udp_ports(2)?;
    let mut config_a = NetworkConfig::loopback(ports[0]);
    config_a.seed_peers = vec![loopback(ports[1])];
    let mut config_b = NetworkConfig::loopback(ports[1]);
    config_b.seed_peers = vec![loopback(ports[0])];
    tweak(&mut config_a);
    tweak(&mut config_b);

    let a = Node::start(&Handle::current(), "node-a", config_a)?;
    let b = Node::start(&Handle::current(), "node-b", config_b)?;
    Ok((a, b))
}

/// Start a pair and wait until each side has verified the other.
pub async fn connected_pair(tweak: impl Fn(&mut NetworkConfig)) -> Result<(Node, Node)> {
    let (a, b) = start_pair(tweak)?;
    if !wait_until(CONVERGE, || verified_each_other(&a, &b)).await {
        bail!(
            "nodes did not verify each other: a={:?} b={:?}",
            a.verified_peers(),
            b.verified_peers()
        );
    }
    Ok((a, b))
}

pub fn verified_each_other(a: &Node, b: &Node) -> bool {
    let a_peers = a.verified_peers();
    let b_peers = b.verified_peers();
    a_peers.len() == 1 && b_peers.len() == 1 && a_peers[0].id == *b.id() && b_peers[0].id == *a.id()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

/// Payloads seen by a callback, in arrival order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn(&[u8]) + Send + Sync + 'static {
        let seen = self.0.clone();
        move |payload| seen.lock().unwrap().push(payload.to_vec())
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_harness_ports_are_distinct() {
    let ports = free_udp_ports(4).unwrap();
    let mut sorted = ports.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pair_converges() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    assert_eq!(a.verified_peers()[0].name, "node-b");
    assert_eq!(b.verified_peers()[0].name, "node-a");
    assert!(a.pending_peers().is_empty());
    assert!(b.pending_peers().is_empty());
}
