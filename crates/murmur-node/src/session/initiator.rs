//! Outbound dial.
//!
//! Connects within `connect_timeout`, then hands the stream to a connection
//! task that opens with our `tcp_ping`. A failed dial clears the pending
//! entry; the next pong from the peer will trigger another attempt.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time;

use murmur_core::NodeId;
use murmur_services::{ConnId, PeerTable};

use super::connection::{self, Role};
use crate::manager::ConnectionManager;

pub(crate) async fn dial(
    manager: Arc<ConnectionManager>,
    peer: NodeId,
    addr: SocketAddr,
    conn_id: ConnId,
) {
    let Some(mut shutdown) = manager.shutdown_signal() else {
        return;
    };

    let timeout = manager.config().connect_timeout();
    let connected = tokio::select! {
        _ = shutdown.recv() => None,
        result = time::timeout(timeout, TcpStream::connect(addr)) => Some(result),
    };

    let stream = match connected {
        None => return,
        Some(Ok(Ok(stream))) => stream,
        Some(Ok(Err(e))) => {
            tracing::warn!(peer = %peer.short(), addr = %addr, error = %e, "connect failed");
            PeerTable::lock(manager.peers()).remove_connection(conn_id);
            return;
        }
        Some(Err(_)) => {
            tracing::warn!(
                peer = %peer.short(),
                addr = %addr,
                timeout_ms = timeout.as_millis() as u64,
                "connect timed out"
            );
            PeerTable::lock(manager.peers()).remove_connection(conn_id);
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "set_nodelay failed");
    }
    tracing::debug!(peer = %peer.short(), addr = %addr, conn_id, "connected, sending handshake");

    connection::run(manager, stream, conn_id, Role::Dialer { expected: peer }).await;
}
