//! TCP sessions: framing, the per-connection task, dialing and accepting.

pub(crate) mod connection;
pub mod framing;
pub(crate) mod initiator;
pub(crate) mod listener;

pub use framing::FrameCodec;
