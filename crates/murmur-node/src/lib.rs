//! murmur-node — the runtime side of a murmur node.
//!
//! A [`Node`] finds peers on the local network over UDP discovery, keeps one
//! verified TCP connection per peer, and routes publications between its
//! local subscribers and its peers.
//!
//! ```no_run
//! use murmur_core::config::NetworkConfig;
//! use murmur_node::{Node, Scope};
//!
//! # fn main() -> Result<(), murmur_node::NodeError> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let node = Node::start(runtime.handle(), "rover", NetworkConfig::default())?;
//! node.subscribe(Scope::Online, "temp", |payload| println!("{payload:?}"));
//! node.publish(Scope::All, "temp", &21.5f32.to_le_bytes())?;
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod error;
pub mod global;
mod manager;
mod node;
pub mod session;

pub use error::{NodeError, SessionError};
pub use manager::LocalEndpoints;
pub use node::Node;

pub use murmur_services::{PeerInfo, Scope, Subscription, SubscriptionId};
