//! Connection manager — the state every runtime task shares.
//!
//! Owns the node identity, the discovery socket, the peer table and the
//! shutdown signal. Discovery, accept, dial and connection tasks all hold an
//! `Arc<ConnectionManager>` and go through it for peer state changes.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use murmur_core::config::NetworkConfig;
use murmur_core::message::{Announcement, Handshake, Publication};
use murmur_core::{NodeId, NodeIdentity, TcpMessage, UdpMessage, Wire, WireError};
use murmur_services::{ConnId, PeerInfo, PeerTable, PubSubRegistry, SharedPeerTable};

use crate::error::NodeError;
use crate::session;

/// Addresses this node's sockets are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEndpoints {
    pub udp: SocketAddr,
    pub tcp: SocketAddr,
}

pub(crate) struct ConnectionManager {
    identity: NodeIdentity,
    config: NetworkConfig,
    endpoints: LocalEndpoints,
    announcement: Announcement,
    peers: SharedPeerTable,
    registry: PubSubRegistry,
    udp: Arc<UdpSocket>,
    runtime: Handle,
    next_conn: AtomicU64,
    /// Online topic set last pushed to peers.
    advertised_topics: Mutex<BTreeSet<String>>,
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
}

impl ConnectionManager {
    pub(crate) fn new(
        identity: NodeIdentity,
        config: NetworkConfig,
        endpoints: LocalEndpoints,
        registry: PubSubRegistry,
        udp: Arc<UdpSocket>,
        runtime: Handle,
    ) -> Self {
        let advertised = config
            .advertise_address
            .unwrap_or(config.bind_address)
            .to_string();
        let announcement = Announcement {
            id: identity.id.clone(),
            name: identity.name.clone(),
            udp_address: advertised.clone(),
            udp_port: endpoints.udp.port(),
            tcp_address: advertised,
            tcp_port: endpoints.tcp.port(),
        };
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            identity,
            config,
            endpoints,
            announcement,
            peers: PeerTable::shared(),
            registry,
            udp,
            runtime,
            next_conn: AtomicU64::new(1),
            advertised_topics: Mutex::new(BTreeSet::new()),
            shutdown_tx,
            stopped: AtomicBool::new(false),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub(crate) fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub(crate) fn local_id(&self) -> &NodeId {
        &self.identity.id
    }

    pub(crate) fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub(crate) fn endpoints(&self) -> LocalEndpoints {
        self.endpoints
    }

    pub(crate) fn peers(&self) -> &SharedPeerTable {
        &self.peers
    }

    pub(crate) fn registry(&self) -> &PubSubRegistry {
        &self.registry
    }

    pub(crate) fn udp(&self) -> &UdpSocket {
        &self.udp
    }

    pub(crate) fn next_conn_id(&self) -> ConnId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    // ── Messages ──────────────────────────────────────────────────────────────

    pub(crate) fn udp_ping(&self) -> Result<Bytes, WireError> {
        UdpMessage::Ping(self.announcement.clone()).to_bytes()
    }

    pub(crate) fn udp_pong(&self) -> Result<Bytes, WireError> {
        UdpMessage::Pong(self.announcement.clone()).to_bytes()
    }

    /// Our announcement plus the current online topics.
    pub(crate) fn handshake(&self) -> Handshake {
        Handshake {
            announcement: self.announcement.clone(),
            topics: self.registry.online_topics().into_iter().collect(),
        }
    }

    /// Encode a `tcp_ping` or `tcp_pong` carrying the current online topics.
    pub(crate) fn handshake_frame(
        &self,
        kind: fn(Handshake) -> TcpMessage,
    ) -> Result<Bytes, WireError> {
        kind(self.handshake()).to_bytes()
    }

    // ── Routing ───────────────────────────────────────────────────────────────

    /// Queue a publication on every eligible verified connection.
    /// Returns the number of connections it was queued on.
    pub(crate) fn publish_online(&self, topic: &str, payload: &[u8]) -> Result<usize, NodeError> {
        let body = TcpMessage::Publication(Publication {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        })
        .to_bytes()?;
        if body.len() > self.config.max_frame_bytes as usize {
            return Err(NodeError::FrameTooLarge {
                size: body.len(),
                max: self.config.max_frame_bytes,
            });
        }

        let routes = PeerTable::lock(&self.peers).routes(topic, self.config.filter_by_interest);
        let sent = routes.iter().filter(|conn| conn.send(body.clone())).count();
        tracing::trace!(topic, peers = sent, bytes = body.len(), "publication routed");
        Ok(sent)
    }

    /// Push a fresh `tcp_ping` to every verified peer if the local online
    /// topic set changed since the last push.
    /// The `advertised_topics` guard is held from reading the topic set until
    /// the update is queued.
    pub(crate) fn subscriptions_changed(&self) {
        let mut advertised = self
            .advertised_topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let topics = self.registry.online_topics();
        if *advertised == topics {
            return;
        }

        let handshake = Handshake {
            announcement: self.announcement.clone(),
            topics: topics.iter().cloned().collect(),
        };
        let body = match TcpMessage::Ping(handshake).to_bytes() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode subscription update");
                return;
            }
        };
        let conns = PeerTable::lock(&self.peers).verified_connections();
        for conn in &conns {
            conn.send(body.clone());
        }
        tracing::debug!(topics = topics.len(), peers = conns.len(), "subscription update sent");
        *advertised = topics;
    }

    // ── Dialing ───────────────────────────────────────────────────────────────

    /// Start a dial to `peer` unless it is already pending or verified.
    pub(crate) fn dial(self: &Arc<Self>, peer: NodeId, addr: SocketAddr) -> bool {
        if self.is_shutdown() {
            return false;
        }
        let conn_id = self.next_conn_id();
        if !PeerTable::lock(&self.peers).begin_dial(peer.clone(), conn_id, addr) {
            tracing::trace!(peer = %peer.short(), "already connected or dialing");
            return false;
        }

        tracing::debug!(peer = %peer.short(), addr = %addr, conn_id, "dialing peer");
        self.runtime
            .spawn(session::initiator::dial(self.clone(), peer, addr, conn_id));
        true
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub(crate) fn verified_peers(&self) -> Vec<PeerInfo> {
        PeerTable::lock(&self.peers).verified_peers()
    }

    pub(crate) fn pending_peers(&self) -> Vec<NodeId> {
        PeerTable::lock(&self.peers).pending_peers()
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// A receiver for the shutdown signal, or `None` once shutdown began.
    /// Tasks subscribe before doing any work so the signal cannot slip past.
    pub(crate) fn shutdown_signal(&self) -> Option<broadcast::Receiver<()>> {
        let rx = self.shutdown_tx.subscribe();
        if self.is_shutdown() {
            return None;
        }
        Some(rx)
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        PeerTable::lock(&self.peers).clear();
        tracing::info!(id = %self.identity.id.short(), "node shutting down");
    }
}
