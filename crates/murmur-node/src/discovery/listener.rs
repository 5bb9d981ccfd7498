//! Discovery datagram listener.
//!
//! Answers foreign pings with a pong and turns pongs from unknown
//! peers into dials. Malformed datagrams are dropped.

use std::sync::Arc;

use murmur_core::wire::MAX_DATAGRAM;
use murmur_core::{UdpMessage, Wire};
use murmur_services::PeerTable;

use super::{classify, pong_targets, DiscoveryAction};
use crate::manager::ConnectionManager;

/// Runs until shutdown.
pub(crate) async fn listener_loop(manager: Arc<ConnectionManager>) {
    let Some(mut shutdown) = manager.shutdown_signal() else {
        return;
    };

    let pong = match manager.udp_pong() {
        Ok(pong) => pong,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode discovery pong");
            return;
        }
    };

    let mut buf = vec![0u8; MAX_DATAGRAM];
    tracing::info!(addr = %manager.endpoints().udp, "discovery listener starting");

    loop {
        let (len, source) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("discovery listener shutting down");
                return;
            }

            received = manager.udp().recv_from(&mut buf) => match received {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                    continue;
                }
            },
        };

        let message = match UdpMessage::from_slice(&buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(from = %source, error = %e, "dropping malformed datagram");
                continue;
            }
        };

        let action = {
            let peers = PeerTable::lock(manager.peers());
            classify(manager.local_id(), &peers, &message, source)
        };

        match action {
            DiscoveryAction::Ignore => {
                tracing::trace!(from = %source, "datagram ignored");
            }
            DiscoveryAction::ReplyPong => {
                if let UdpMessage::Ping(a) = &message {
                    tracing::trace!(peer = %a.id.short(), name = %a.name, "ping received");
                }
                for target in pong_targets(manager.config(), source) {
                    if let Err(e) = manager.udp().send_to(&pong, target).await {
                        tracing::warn!(error = %e, to = %target, "pong send failed");
                    }
                }
            }
            DiscoveryAction::Dial { peer, addr } => {
                tracing::debug!(peer = %peer.short(), addr = %addr, "we have lower id, dialing");
                manager.dial(peer, addr);
            }
        }
    }
}
