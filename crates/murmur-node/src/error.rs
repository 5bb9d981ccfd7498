//! Error types for the node runtime.

use murmur_core::{NodeId, WireError};

/// Errors surfaced to callers of [`crate::Node`] and [`crate::global`].
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to bind {what}: {source}")]
    Bind {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode failed: {0}")]
    Wire(#[from] WireError),

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: u32 },

    #[error("no node installed")]
    NotInitialized,

    #[error("a node is already installed")]
    AlreadyInitialized,
}

/// Why a single TCP connection was closed. Logged, never returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Wire(#[from] WireError),

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: u32 },

    #[error("handshake carries our own id")]
    SelfConnection,

    #[error("unexpected handshake from {0}")]
    UnexpectedPeer(NodeId),

    #[error("peer {0} already has a connection")]
    Duplicate(NodeId),

    #[error("handshake did not complete in time")]
    HandshakeTimeout,

    #[error("peer stopped reading, write blocked for {0:?}")]
    WriteTimeout(std::time::Duration),
}
