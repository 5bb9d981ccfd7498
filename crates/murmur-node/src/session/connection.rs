//! Per-connection task.
//!
//! One task owns each TCP stream. It writes queued bodies from the
//! connection's handle, reads frames, runs the handshake and delivers
//! publications. Whatever ends the task, its entries leave the peer table.
//! A write that stays blocked past `write_timeout` ends the task too.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::codec::Framed;

use murmur_core::message::{Handshake, Publication};
use murmur_core::wire::OUTBOUND_QUEUE_DEPTH;
use murmur_core::{NodeId, TcpMessage, Wire};
use murmur_services::{ConnId, ConnectionHandle, PeerTable};

use super::framing::FrameCodec;
use crate::error::SessionError;
use crate::manager::ConnectionManager;

/// Which side of the connection we are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    /// We dialed; the handshake must come from `expected`.
    Dialer { expected: NodeId },
    /// We accepted; the peer is unknown until its `tcp_ping` arrives.
    Acceptor,
}

struct Connection {
    manager: Arc<ConnectionManager>,
    conn_id: ConnId,
    handle: ConnectionHandle,
    role: Role,
    remote: Option<SocketAddr>,
    /// Set once the handshake completes.
    peer: Option<NodeId>,
    /// Topics carried by our opening `tcp_ping`, when we dialed.
    sent_topics: Vec<String>,
}

/// Drive one connection to completion, then sweep its peer table entries.
pub(crate) async fn run(
    manager: Arc<ConnectionManager>,
    stream: TcpStream,
    conn_id: ConnId,
    role: Role,
) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let mut conn = Connection {
        manager,
        conn_id,
        handle: ConnectionHandle::new(conn_id, tx),
        role,
        remote: stream.peer_addr().ok(),
        peer: None,
        sent_topics: Vec::new(),
    };

    let result = conn.drive(stream, rx).await;
    let removed = PeerTable::lock(conn.manager.peers()).remove_connection(conn_id);

    let peer = conn.peer.as_ref().map(|p| p.short().to_string());
    match result {
        Ok(()) => {
            if conn.peer.is_some() {
                tracing::info!(peer = ?peer, conn_id, "peer disconnected");
            } else {
                tracing::debug!(remote = ?conn.remote, conn_id, "connection closed before handshake");
            }
        }
        Err(e @ (SessionError::SelfConnection | SessionError::Duplicate(_))) => {
            tracing::debug!(remote = ?conn.remote, conn_id, reason = %e, "connection dropped");
        }
        Err(e) => {
            tracing::warn!(peer = ?peer, remote = ?conn.remote, conn_id, error = %e, "connection failed");
        }
    }
    if !removed.is_empty() {
        tracing::trace!(conn_id, removed = removed.len(), "peer table entries removed");
    }
}

impl Connection {
    async fn drive(
        &mut self,
        stream: TcpStream,
        mut outbound: mpsc::Receiver<Bytes>,
    ) -> Result<(), SessionError> {
        let Some(mut shutdown) = self.manager.shutdown_signal() else {
            return Ok(());
        };

        let mut framed = Framed::new(stream, FrameCodec::new(self.manager.config().max_frame_bytes));
        let deadline = time::sleep(self.manager.config().handshake_timeout());
        tokio::pin!(deadline);

        if matches!(self.role, Role::Dialer { .. }) {
            let handshake = self.manager.handshake();
            self.sent_topics = handshake.topics.clone();
            self.write(&mut framed, TcpMessage::Ping(handshake).to_bytes()?).await?;
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),

                _ = &mut deadline, if self.peer.is_none() => {
                    return Err(SessionError::HandshakeTimeout);
                }

                Some(body) = outbound.recv() => self.write(&mut framed, body).await?,

                frame = framed.next() => match frame {
                    None => return Ok(()),
                    Some(frame) => {
                        if let Some(reply) = self.handle_frame(&frame?)? {
                            self.write(&mut framed, reply).await?;
                        }
                    }
                },
            }
        }
    }

    async fn write(
        &self,
        framed: &mut Framed<TcpStream, FrameCodec>,
        body: Bytes,
    ) -> Result<(), SessionError> {
        let limit = self.manager.config().write_timeout();
        match time::timeout(limit, framed.send(body)).await {
            Ok(sent) => sent,
            Err(_) => Err(SessionError::WriteTimeout(limit)),
        }
    }

    /// Handle one inbound frame. Returns a body to write back, if any.
    fn handle_frame(&mut self, frame: &[u8]) -> Result<Option<Bytes>, SessionError> {
        match TcpMessage::from_slice(frame)? {
            TcpMessage::Ping(h) => self.on_handshake(h, true),
            TcpMessage::Pong(h) => self.on_handshake(h, false),
            TcpMessage::Publication(p) => {
                self.on_publication(p);
                Ok(None)
            }
            TcpMessage::Unknown(tag) => {
                tracing::trace!(conn_id = self.conn_id, tag = %tag, "ignoring unknown message");
                Ok(None)
            }
        }
    }

    fn on_handshake(&mut self, h: Handshake, is_ping: bool) -> Result<Option<Bytes>, SessionError> {
        let id = h.announcement.id;
        if id == *self.manager.local_id() {
            return Err(SessionError::SelfConnection);
        }
        let topics: BTreeSet<String> = h.topics.into_iter().collect();

        // Already verified: a ping or pong is a subscription update.
        if let Some(peer) = &self.peer {
            if *peer != id {
                return Err(SessionError::UnexpectedPeer(id));
            }
            PeerTable::lock(self.manager.peers()).update_topics(&id, self.conn_id, topics);
            tracing::debug!(peer = %id.short(), "peer subscriptions updated");
            return Ok(None);
        }

        {
            let mut peers = PeerTable::lock(self.manager.peers());
            match &self.role {
                Role::Dialer { expected } if *expected != id => {
                    return Err(SessionError::UnexpectedPeer(id));
                }
                Role::Dialer { .. } => {}
                Role::Acceptor if !is_ping => return Err(SessionError::UnexpectedPeer(id)),
                Role::Acceptor => {
                    // We are the designated dialer for this pair and our dial
                    // is in flight; let that one win.
                    if peers.is_pending(&id) && self.manager.local_id() < &id {
                        return Err(SessionError::Duplicate(id));
                    }
                }
            }
            peers
                .verify(id.clone(), self.handle.clone(), h.announcement.name.clone(), topics)
                .map_err(|_| SessionError::Duplicate(id.clone()))?;
        }

        tracing::info!(
            peer = %id.short(),
            name = %h.announcement.name,
            remote = ?self.remote,
            conn_id = self.conn_id,
            "peer verified"
        );
        self.peer = Some(id);

        if is_ping {
            return Ok(Some(self.manager.handshake_frame(TcpMessage::Pong)?));
        }

        // Our subscriptions may have moved since the opening ping; updates
        // only go to verified peers, so catch this one up now.
        let current = self.manager.handshake();
        if current.topics != self.sent_topics {
            return Ok(Some(TcpMessage::Ping(current).to_bytes()?));
        }
        Ok(None)
    }

    fn on_publication(&self, publication: Publication) {
        if self.peer.is_none() {
            tracing::debug!(
                conn_id = self.conn_id,
                topic = %publication.topic,
                "publication before handshake, ignored"
            );
            return;
        }
        let delivered = self
            .manager
            .registry()
            .publish_online(&publication.topic, &publication.payload);
        tracing::trace!(
            topic = %publication.topic,
            bytes = publication.payload.len(),
            delivered,
            "publication received"
        );
    }
}
