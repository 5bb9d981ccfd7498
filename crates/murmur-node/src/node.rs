//! Node — the public handle to one pub/sub participant.
//!
//! `Node::start` binds the discovery socket and TCP listener, then spawns the
//! announce, discovery listener and accept tasks on the supplied runtime.
//! Dropping the node shuts all of them down.

use std::net::SocketAddrV4;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tokio::runtime::Handle;

use murmur_core::config::NetworkConfig;
use murmur_core::{NodeId, NodeIdentity, Wire};
use murmur_services::{PeerInfo, PubSubRegistry, Scope, Subscription};

use crate::discovery;
use crate::error::NodeError;
use crate::manager::{ConnectionManager, LocalEndpoints};
use crate::session;

pub struct Node {
    manager: Arc<ConnectionManager>,
}

impl Node {
    /// Bind sockets and start the node's background tasks on `runtime`.
    pub fn start(
        runtime: &Handle,
        name: impl Into<String>,
        config: NetworkConfig,
    ) -> Result<Node, NodeError> {
        let identity = NodeIdentity::generate(name);

        let udp = discovery::bind_socket(&config).map_err(|source| NodeError::Bind {
            what: "discovery socket",
            source,
        })?;
        let tcp = std::net::TcpListener::bind(SocketAddrV4::new(config.bind_address, config.tcp_port))
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .map_err(|source| NodeError::Bind {
                what: "tcp listener",
                source,
            })?;
        let endpoints = LocalEndpoints {
            udp: udp.local_addr()?,
            tcp: tcp.local_addr()?,
        };

        // Tokio sockets register with the reactor of the current runtime.
        let _guard = runtime.enter();
        let udp = Arc::new(UdpSocket::from_std(udp)?);
        let listener = TcpListener::from_std(tcp)?;

        let manager = Arc::new(ConnectionManager::new(
            identity,
            config,
            endpoints,
            PubSubRegistry::new(),
            udp,
            runtime.clone(),
        ));

        runtime.spawn(discovery::announce::announce_loop(manager.clone()));
        runtime.spawn(discovery::listener::listener_loop(manager.clone()));
        runtime.spawn(session::listener::accept_loop(manager.clone(), listener));

        tracing::info!(
            id = %manager.local_id(),
            name = %manager.identity().name,
            udp = %endpoints.udp,
            tcp = %endpoints.tcp,
            "node started"
        );

        Ok(Node { manager })
    }

    pub fn identity(&self) -> &NodeIdentity {
        self.manager.identity()
    }

    pub fn id(&self) -> &NodeId {
        self.manager.local_id()
    }

    pub fn local_endpoints(&self) -> LocalEndpoints {
        self.manager.endpoints()
    }

    /// Publish `payload` on `topic`.
    ///
    /// `Offline` runs local offline callbacks on the calling thread before
    /// returning. `Online` queues the publication for verified peers. `All`
    /// does both. Fails only if the payload cannot be framed, in which case
    /// nothing is delivered.
    pub fn publish(&self, scope: Scope, topic: &str, payload: &[u8]) -> Result<(), NodeError> {
        if scope.includes_online() {
            self.manager.publish_online(topic, payload)?;
        }
        if scope.includes_offline() {
            self.manager.registry().publish_offline(topic, payload);
        }
        Ok(())
    }

    pub fn publish_value<T: Wire>(&self, scope: Scope, topic: &str, value: &T) -> Result<(), NodeError> {
        let payload = value.to_bytes()?;
        self.publish(scope, topic, &payload)
    }

    pub fn subscribe<F>(&self, scope: Scope, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let subscription = self.manager.registry().subscribe(scope, topic, callback);
        if scope.includes_online() {
            self.manager.subscriptions_changed();
        }
        subscription
    }

    /// Subscribe with a callback that receives decoded values. Payloads that
    /// do not decode as `T` are logged and skipped.
    pub fn subscribe_value<T, F>(&self, scope: Scope, topic: &str, callback: F) -> Subscription
    where
        T: Wire + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let owned_topic = topic.to_string();
        self.subscribe(scope, topic, move |payload| match T::from_slice(payload) {
            Ok(value) => callback(value),
            Err(e) => tracing::debug!(topic = %owned_topic, error = %e, "payload did not decode, skipped"),
        })
    }

    /// Remove a subscription. Unknown subscriptions are a no-op (`false`).
    pub fn unsubscribe(&self, scope: Scope, topic: &str, subscription: &Subscription) -> bool {
        let removed = self.manager.registry().unsubscribe(scope, topic, subscription);
        if removed && scope.includes_online() {
            self.manager.subscriptions_changed();
        }
        removed
    }

    pub fn online_topics(&self) -> Vec<String> {
        self.manager.registry().online_topics().into_iter().collect()
    }

    pub fn verified_peers(&self) -> Vec<PeerInfo> {
        self.manager.verified_peers()
    }

    pub fn pending_peers(&self) -> Vec<NodeId> {
        self.manager.pending_peers()
    }

    /// Stop discovery, accept and every connection. Idempotent.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", self.manager.local_id())
            .field("name", &self.manager.identity().name)
            .field("endpoints", &self.manager.endpoints())
            .finish()
    }
}
