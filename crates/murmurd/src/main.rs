//! murmurd — runs one murmur node and logs the traffic on configured topics.
//!
//! Usage: murmurd [name]
//!
//! The name defaults to `[node] name` from the config file. Logging is
//! controlled through RUST_LOG.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use murmur_core::config::MurmurConfig;
use murmur_node::{Node, Scope};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MurmurConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MurmurConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MurmurConfig::default()
    });

    let name = std::env::args().nth(1).unwrap_or_else(|| config.node.name.clone());
    tracing::info!(
        name = %name,
        discovery_port = config.network.discovery_port,
        broadcast = config.network.broadcast,
        seeds = config.network.seed_peers.len(),
        "murmurd starting"
    );

    let node = Node::start(&Handle::current(), name, config.network.clone())
        .context("failed to start node")?;

    let _subscriptions: Vec<_> = config
        .daemon
        .subscribe
        .iter()
        .map(|topic| {
            let owned = topic.clone();
            tracing::info!(topic = %owned, "subscribing");
            node.subscribe(Scope::All, topic, move |payload| {
                tracing::info!(
                    topic = %owned,
                    bytes = payload.len(),
                    payload = %preview(payload),
                    "publication"
                );
            })
        })
        .collect();

    let status = status_loop(&node, config.daemon.status_interval_secs);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::info!("ctrl-c received");
        }
        _ = status => {}
    }

    node.shutdown();
    tracing::info!("murmurd stopped");
    Ok(())
}

/// Log a peer table snapshot every `interval_secs`. Never returns when
/// enabled; pends forever when disabled.
async fn status_loop(node: &Node, interval_secs: u64) {
    if interval_secs == 0 {
        return std::future::pending().await;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let verified = node.verified_peers();
        let pending = node.pending_peers();
        tracing::info!(
            verified = verified.len(),
            pending = pending.len(),
            topics = node.online_topics().len(),
            "status"
        );
        for peer in &verified {
            tracing::debug!(
                peer = %peer.id.short(),
                name = %peer.name,
                topics = ?peer.topics,
                "verified peer"
            );
        }
    }
}

/// Payload as text when it is printable UTF-8, otherwise a hex prefix.
fn preview(payload: &[u8]) -> String {
    const MAX: usize = 64;
    match std::str::from_utf8(payload) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => s.chars().take(MAX).collect(),
        _ => {
            let head = &payload[..payload.len().min(MAX)];
            let suffix = if payload.len() > MAX { "…" } else { "" };
            format!("0x{}{}", hex::encode(head), suffix)
        }
    }
}
