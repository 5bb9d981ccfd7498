//! Process-wide node.
//!
//! Thin free functions over one installed [`Node`], for programs that want a
//! single node reachable from anywhere. Calls before [`install`] return
//! [`NodeError::NotInitialized`].

use std::sync::OnceLock;

use murmur_services::{Scope, Subscription};

use crate::error::NodeError;
use crate::node::Node;

static NODE: OnceLock<Node> = OnceLock::new();

/// Install `node` as the process-wide node. Only the first call succeeds;
/// a rejected node is dropped, which shuts it down.
pub fn install(node: Node) -> Result<(), NodeError> {
    NODE.set(node).map_err(|_rejected| {
        tracing::warn!("node already installed, rejecting second install");
        NodeError::AlreadyInitialized
    })
}

/// The installed node.
pub fn node() -> Result<&'static Node, NodeError> {
    NODE.get().ok_or_else(|| {
        tracing::warn!("no node installed");
        NodeError::NotInitialized
    })
}

pub fn publish(scope: Scope, topic: &str, payload: &[u8]) -> Result<(), NodeError> {
    node()?.publish(scope, topic, payload)
}

pub fn subscribe<F>(scope: Scope, topic: &str, callback: F) -> Result<Subscription, NodeError>
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    Ok(node()?.subscribe(scope, topic, callback))
}

pub fn unsubscribe(scope: Scope, topic: &str, subscription: &Subscription) -> Result<bool, NodeError> {
    Ok(node()?.unsubscribe(scope, topic, subscription))
}
