//! murmur-services — shared state containers used by the node runtime:
//! the subscriber registry and the peer table.

pub mod peer;
pub mod pubsub;

pub use peer::{
    ConnId, ConnectionHandle, PeerInfo, PeerTable, SharedPeerTable, VerifiedPeer, VerifyError,
};
pub use pubsub::{Callback, PubSubRegistry, Scope, Subscription, SubscriptionId};
