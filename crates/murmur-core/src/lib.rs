//! murmur-core — wire codec, protocol messages, payload values and configuration.
//! All other Murmur crates depend on this one.

pub mod config;
pub mod message;
pub mod value;
pub mod wire;

pub use message::{NodeId, NodeIdentity, TcpMessage, UdpMessage};
pub use wire::{Wire, WireError};
