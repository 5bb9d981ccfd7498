//! Murmur protocol messages.
//!
//! Every message starts with a type-tag string that decides how the rest of the
//! buffer is parsed. UDP datagrams carry exactly one `udp_ping` or `udp_pong`.
//! TCP frames carry one `tcp_ping`, `tcp_pong` or `publication`.
//!
//! Field order for the four discovery messages:
//!   tag, id, name, udp_address, udp_port, tcp_address, tcp_port
//! and for the TCP variants only:
//!   topic_count (u32), topics...
//!
//! Decode order mirrors encode order exactly. Reordering a field desyncs every
//! later read on that connection.

use std::fmt;

use bytes::{Buf, BufMut, Bytes};

use crate::wire::{Wire, WireError};

pub const TAG_UDP_PING: &str = "udp_ping";
pub const TAG_UDP_PONG: &str = "udp_pong";
pub const TAG_TCP_PING: &str = "tcp_ping";
pub const TAG_TCP_PONG: &str = "tcp_pong";
pub const TAG_PUBLICATION: &str = "publication";

// ── Identity ──────────────────────────────────────────────────────────────────

/// A node's 128-bit random identifier, as 32 lowercase hex characters.
///
/// Ordering is lexicographic on the string and decides which side of a peer
/// pair dials: the smaller id initiates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn generate() -> Self {
        Self(hex::encode(rand::random::<[u8; 16]>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Wire for NodeId {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.0.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        String::decode(buf).map(Self)
    }
}

/// Who a node is. Fixed for the node's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub name: String,
}

impl NodeIdentity {
    pub fn generate(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
        }
    }
}

// ── Discovery bodies ──────────────────────────────────────────────────────────

/// Identity and endpoints, as carried by every ping and pong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub id: NodeId,
    pub name: String,
    pub udp_address: String,
    pub udp_port: u16,
    pub tcp_address: String,
    pub tcp_port: u16,
}

impl Wire for Announcement {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.id.encode(buf)?;
        self.name.encode(buf)?;
        self.udp_address.encode(buf)?;
        self.udp_port.encode(buf)?;
        self.tcp_address.encode(buf)?;
        self.tcp_port.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        Ok(Self {
            id: NodeId::decode(buf)?,
            name: String::decode(buf)?,
            udp_address: String::decode(buf)?,
            udp_port: u16::decode(buf)?,
            tcp_address: String::decode(buf)?,
            tcp_port: u16::decode(buf)?,
        })
    }
}

/// An announcement plus the sender's current online topic snapshot.
/// Sent once per connection to complete the handshake, then again whenever
/// the sender's online subscriptions change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub announcement: Announcement,
    pub topics: Vec<String>,
}

impl Wire for Handshake {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.announcement.encode(buf)?;
        self.topics.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        Ok(Self {
            announcement: Announcement::decode(buf)?,
            topics: Vec::decode(buf)?,
        })
    }
}

/// A published payload on its way to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
}

impl Wire for Publication {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.topic.encode(buf)?;
        self.payload.encode(buf)
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        Ok(Self {
            topic: String::decode(buf)?,
            payload: Bytes::decode(buf)?,
        })
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

/// A discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdpMessage {
    Ping(Announcement),
    Pong(Announcement),
    /// A tag this version does not understand. Ignored by receivers.
    Unknown(String),
}

impl Wire for UdpMessage {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        match self {
            UdpMessage::Ping(a) => {
                TAG_UDP_PING.to_string().encode(buf)?;
                a.encode(buf)
            }
            UdpMessage::Pong(a) => {
                TAG_UDP_PONG.to_string().encode(buf)?;
                a.encode(buf)
            }
            UdpMessage::Unknown(tag) => tag.encode(buf),
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        let tag = String::decode(buf)?;
        match tag.as_str() {
            TAG_UDP_PING => Announcement::decode(buf).map(UdpMessage::Ping),
            TAG_UDP_PONG => Announcement::decode(buf).map(UdpMessage::Pong),
            _ => Ok(UdpMessage::Unknown(tag)),
        }
    }
}

/// The body of one TCP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpMessage {
    Ping(Handshake),
    Pong(Handshake),
    Publication(Publication),
    /// A tag this version does not understand. Ignored by receivers.
    Unknown(String),
}

impl TcpMessage {
    pub fn tag(&self) -> &str {
        match self {
            TcpMessage::Ping(_) => TAG_TCP_PING,
            TcpMessage::Pong(_) => TAG_TCP_PONG,
            TcpMessage::Publication(_) => TAG_PUBLICATION,
            TcpMessage::Unknown(tag) => tag,
        }
    }
}

impl Wire for TcpMessage {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        self.tag().to_string().encode(buf)?;
        match self {
            TcpMessage::Ping(h) | TcpMessage::Pong(h) => h.encode(buf),
            TcpMessage::Publication(p) => p.encode(buf),
            TcpMessage::Unknown(_) => Ok(()),
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        let tag = String::decode(buf)?;
        match tag.as_str() {
            TAG_TCP_PING => Handshake::decode(buf).map(TcpMessage::Ping),
            TAG_TCP_PONG => Handshake::decode(buf).map(TcpMessage::Pong),
            TAG_PUBLICATION => Publication::decode(buf).map(TcpMessage::Publication),
            _ => Ok(TcpMessage::Unknown(tag)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
