//! TCP accept loop. Every accepted stream gets its own connection task;
//! the peer is identified by its first `tcp_ping`.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::connection::{self, Role};
use crate::manager::ConnectionManager;

/// Runs until shutdown.
pub(crate) async fn accept_loop(manager: Arc<ConnectionManager>, listener: TcpListener) {
    let Some(mut shutdown) = manager.shutdown_signal() else {
        return;
    };

    tracing::info!(addr = %manager.endpoints().tcp, "session listener starting");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("session listener shutting down");
                return;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "set_nodelay failed");
                    }
                    let conn_id = manager.next_conn_id();
                    tracing::debug!(remote = %remote, conn_id, "connection accepted");
                    tokio::spawn(connection::run(manager.clone(), stream, conn_id, Role::Acceptor));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }
}
