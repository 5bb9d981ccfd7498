//! Discovery ping loop.
//!
//! Sends a `udp_ping` every `discovery_interval` to the broadcast address
//! (when enabled) and to every configured seed peer.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time;

use crate::manager::ConnectionManager;

/// Destinations for one discovery round.
pub(crate) fn targets(manager: &ConnectionManager) -> Vec<SocketAddr> {
    let config = manager.config();
    let mut targets: Vec<SocketAddr> = super::broadcast_target(config).into_iter().collect();
    targets.extend(config.seed_peers.iter().copied());
    targets
}

/// Runs until shutdown.
pub(crate) async fn announce_loop(manager: Arc<ConnectionManager>) {
    let Some(mut shutdown) = manager.shutdown_signal() else {
        return;
    };

    let ping = match manager.udp_ping() {
        Ok(ping) => ping,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode discovery ping");
            return;
        }
    };
    let targets = targets(&manager);
    if targets.is_empty() {
        tracing::warn!("broadcast disabled and no seed peers, discovery will not send pings");
    }

    let mut interval = time::interval(manager.config().discovery_interval());
    tracing::info!(
        targets = targets.len(),
        interval_ms = manager.config().discovery_interval().as_millis() as u64,
        "discovery announce starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("discovery announce shutting down");
                return;
            }

            _ = interval.tick() => {
                for target in &targets {
                    match manager.udp().send_to(&ping, *target).await {
                        Ok(n) => tracing::trace!(bytes = n, to = %target, "ping sent"),
                        Err(e) => tracing::warn!(error = %e, to = %target, "ping send failed"),
                    }
                }
            }
        }
    }
}
