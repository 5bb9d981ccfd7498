//! Peer table — tracks connection state for every known peer.
//!
//! Two maps keyed on peer id:
//!   - pending:  we dialed this peer and the handshake has not completed
//!   - verified: handshake complete, publications are routed here
//!
//! A peer id lives in at most one map and never twice in `verified`.
//! Every entry names the connection it belongs to, so a dead connection can
//! be swept from both maps by its id alone.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::mpsc;

use murmur_core::NodeId;

/// Per-node unique connection number.
pub type ConnId = u64;

/// Queue end for one connection. The connection task owns the socket and
/// writes whatever bodies arrive here, in order, one frame each.
///
/// The queue is bounded. When a peer reads slower than we publish, bodies
/// beyond the bound are dropped rather than buffered.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::Sender<Bytes>,
}

impl ConnectionHandle {
    pub fn new(id: ConnId, tx: mpsc::Sender<Bytes>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue a message body. Returns false if the connection has closed or
    /// its queue is full; the body is dropped either way.
    pub fn send(&self, body: Bytes) -> bool {
        match self.tx.try_send(body) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(conn_id = self.id, "outbound queue full, body dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// An outbound dial that has not completed its handshake.
#[derive(Debug, Clone)]
pub struct PendingPeer {
    pub conn_id: ConnId,
    pub addr: SocketAddr,
    pub started_at: Instant,
}

/// A peer whose handshake completed.
#[derive(Debug, Clone)]
pub struct VerifiedPeer {
    pub conn: ConnectionHandle,
    pub name: String,
    /// Topics the peer last announced online interest in.
    pub topics: BTreeSet<String>,
    pub verified_at: Instant,
}

/// Snapshot of a verified peer, for callers outside the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: NodeId,
    pub name: String,
    pub conn_id: ConnId,
    pub topics: BTreeSet<String>,
}

/// Why a connection could not be promoted to verified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("peer {peer} already verified on connection {existing}")]
    AlreadyVerified { peer: NodeId, existing: ConnId },
}

/// Shared peer table.
pub type SharedPeerTable = Arc<Mutex<PeerTable>>;

#[derive(Debug, Default)]
pub struct PeerTable {
    pending: HashMap<NodeId, PendingPeer>,
    verified: HashMap<NodeId, VerifiedPeer>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPeerTable {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Lock a shared table. Never held across an await point, so a poisoned
    /// guard still holds consistent maps.
    pub fn lock(table: &SharedPeerTable) -> MutexGuard<'_, PeerTable> {
        table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_known(&self, peer: &NodeId) -> bool {
        self.pending.contains_key(peer) || self.verified.contains_key(peer)
    }

    pub fn is_pending(&self, peer: &NodeId) -> bool {
        self.pending.contains_key(peer)
    }

    pub fn is_verified(&self, peer: &NodeId) -> bool {
        self.verified.contains_key(peer)
    }

    /// Record an outbound dial. Refused if the peer is already pending or
    /// verified.
    pub fn begin_dial(&mut self, peer: NodeId, conn_id: ConnId, addr: SocketAddr) -> bool {
        if self.is_known(&peer) {
            return false;
        }
        self.pending.insert(
            peer,
            PendingPeer {
                conn_id,
                addr,
                started_at: Instant::now(),
            },
        );
        true
    }

    /// The connection id of our in-flight dial to `peer`, if any.
    pub fn pending_conn(&self, peer: &NodeId) -> Option<ConnId> {
        self.pending.get(peer).map(|p| p.conn_id)
    }

    /// Promote `conn` to the verified connection for `peer`.
    ///
    /// Clears any pending dial for the peer. Re-verifying the same connection
    /// refreshes name and topics. A different connection for an already
    /// verified peer is refused.
    pub fn verify(
        &mut self,
        peer: NodeId,
        conn: ConnectionHandle,
        name: String,
        topics: BTreeSet<String>,
    ) -> Result<(), VerifyError> {
        if let Some(existing) = self.verified.get_mut(&peer) {
            if existing.conn.id() != conn.id() {
                return Err(VerifyError::AlreadyVerified {
                    peer,
                    existing: existing.conn.id(),
                });
            }
            existing.name = name;
            existing.topics = topics;
            return Ok(());
        }

        self.pending.remove(&peer);
        self.verified.insert(
            peer,
            VerifiedPeer {
                conn,
                name,
                topics,
                verified_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Replace the recorded topic set for `peer`, if `conn_id` is its
    /// verified connection.
    pub fn update_topics(&mut self, peer: &NodeId, conn_id: ConnId, topics: BTreeSet<String>) -> bool {
        match self.verified.get_mut(peer) {
            Some(entry) if entry.conn.id() == conn_id => {
                entry.topics = topics;
                true
            }
            _ => false,
        }
    }

    /// Remove every entry, pending or verified, that belongs to `conn_id`.
    /// Returns the peer ids that were removed.
    pub fn remove_connection(&mut self, conn_id: ConnId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        self.pending.retain(|peer, entry| {
            let keep = entry.conn_id != conn_id;
            if !keep {
                removed.push(peer.clone());
            }
            keep
        });
        self.verified.retain(|peer, entry| {
            let keep = entry.conn.id() != conn_id;
            if !keep {
                removed.push(peer.clone());
            }
            keep
        });
        removed
    }

    /// Connections a publication on `topic` should be written to.
    /// With `filter_by_interest`, only peers that announced the topic.
    pub fn routes(&self, topic: &str, filter_by_interest: bool) -> Vec<ConnectionHandle> {
        self.verified
            .values()
            .filter(|p| !filter_by_interest || p.topics.contains(topic))
            .map(|p| p.conn.clone())
            .collect()
    }

    /// Every verified connection.
    pub fn verified_connections(&self) -> Vec<ConnectionHandle> {
        self.verified.values().map(|p| p.conn.clone()).collect()
    }

    pub fn verified_peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .verified
            .iter()
            .map(|(id, p)| PeerInfo {
                id: id.clone(),
                name: p.name.clone(),
                conn_id: p.conn.id(),
                topics: p.topics.clone(),
            })
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    pub fn pending_peers(&self) -> Vec<NodeId> {
        let mut peers: Vec<NodeId> = self.pending.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn verified_count(&self) -> usize {
        self.verified.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.verified.clear();
    }
}
