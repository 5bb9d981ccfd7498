//! UDP discovery.
//!
//! Every node sends `udp_ping` on an interval (broadcast and/or seed peers)
//! and answers pings with a `udp_pong` on the broadcast address and to the
//! ping's source. Nodes sharing a host share the discovery port, and a
//! unicast datagram to that port reaches only one of them; the broadcast copy
//! reaches all, and receivers drop pongs they do not need by id. A pong from
//! an unknown peer
//! triggers a TCP dial, but only from the side with the smaller id, so each
//! pair of nodes opens exactly one connection in the common case.

pub mod announce;
pub mod listener;

use std::net::{IpAddr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};

use murmur_core::config::NetworkConfig;
use murmur_core::message::Announcement;
use murmur_core::{NodeId, UdpMessage};
use murmur_services::PeerTable;

/// What the listener should do with a decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryAction {
    Ignore,
    /// Answer with a `udp_pong`, see [`pong_targets`].
    ReplyPong,
    /// Open a TCP connection to the announcing peer.
    Dial { peer: NodeId, addr: SocketAddr },
}

/// Decide how to react to one discovery datagram.
pub fn classify(
    local: &NodeId,
    peers: &PeerTable,
    message: &UdpMessage,
    source: SocketAddr,
) -> DiscoveryAction {
    match message {
        UdpMessage::Ping(a) if a.id == *local => DiscoveryAction::Ignore,
        UdpMessage::Ping(_) => DiscoveryAction::ReplyPong,
        UdpMessage::Pong(a) => {
            if a.id == *local || peers.is_known(&a.id) {
                return DiscoveryAction::Ignore;
            }
            // The smaller id dials; the larger one only accepts.
            if *local >= a.id {
                return DiscoveryAction::Ignore;
            }
            match dial_address(a, source) {
                Some(addr) => DiscoveryAction::Dial {
                    peer: a.id.clone(),
                    addr,
                },
                None => DiscoveryAction::Ignore,
            }
        }
        UdpMessage::Unknown(_) => DiscoveryAction::Ignore,
    }
}

/// Where to reach an announced TCP endpoint. Falls back to the datagram's
/// source address when the advertised one is unspecified or unparsable.
pub fn dial_address(announcement: &Announcement, source: SocketAddr) -> Option<SocketAddr> {
    if announcement.tcp_port == 0 {
        return None;
    }
    let ip = match announcement.tcp_address.parse::<IpAddr>() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => source.ip(),
    };
    Some(SocketAddr::new(ip, announcement.tcp_port))
}

/// The broadcast destination, when broadcast is enabled.
pub fn broadcast_target(config: &NetworkConfig) -> Option<SocketAddr> {
    config
        .broadcast
        .then(|| SocketAddr::V4(SocketAddrV4::new(config.broadcast_address, config.discovery_port)))
}

/// Where to send the pong for a ping from `source`: the broadcast address
/// when enabled, and the source itself unless it is that same address.
pub fn pong_targets(config: &NetworkConfig, source: SocketAddr) -> Vec<SocketAddr> {
    let mut targets: Vec<SocketAddr> = broadcast_target(config).into_iter().collect();
    if !targets.contains(&source) {
        targets.push(source);
    }
    targets
}

/// Create the discovery socket: broadcast enabled, address (and on unix,
/// port) reuse so several nodes can share one host.
pub(crate) fn bind_socket(config: &NetworkConfig) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(config.bind_address, config.discovery_port);
    socket.bind(&bind_addr.into())?;

    Ok(socket.into())
}
