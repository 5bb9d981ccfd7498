//! Murmur wire codec — the field-level encoding shared by every message.
//!
//! Every value on the wire is one of:
//!   - a fixed-width number or bool, written as its raw bytes
//!   - a u32 length prefix followed by that many raw bytes (strings, payloads)
//!   - a u32 element count followed by that many encoded elements (topic lists)
//!
//! All multi-byte integers and floats are LITTLE-ENDIAN. There is no byte-order
//! tag on the wire, so this choice is part of the protocol and must never change.
//!
//! Decoding consumes a prefix of the buffer. Repeated decodes parse sequential
//! fields. Every decode checks the remaining length first; a short buffer is a
//! `WireError::Truncated`, never an out-of-bounds read.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Well-known UDP port for discovery datagrams. Used for both send and receive.
pub const DISCOVERY_PORT: u16 = 21075;

/// Default discovery ping interval in milliseconds.
pub const DISCOVERY_INTERVAL_MS: u64 = 1000;

/// Default TCP connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 3000;

/// Default handshake timeout in milliseconds.
/// A connection that is not verified within this window is dropped.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Default bound on writing one frame to a peer. A peer that stops reading
/// for longer is disconnected.
pub const WRITE_TIMEOUT_MS: u64 = 5000;

/// Bodies that may wait in one connection's outbound queue. Further bodies
/// are dropped until the writer catches up.
pub const OUTBOUND_QUEUE_DEPTH: usize = 1024;

/// Default upper bound on a single TCP frame body.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Size of the TCP frame length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest UDP datagram the discovery listener will read.
pub const MAX_DATAGRAM: usize = 65_507;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid bool byte: 0x{0:02x}")]
    InvalidBool(u8),

    #[error("length {0} does not fit in a u32 prefix")]
    LengthOverflow(usize),
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// A value with a fixed wire encoding.
pub trait Wire: Sized {
    /// Append this value's encoding to `buf`.
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError>;

    /// Consume this value's encoding from the front of `buf`.
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode from the front of a slice. Trailing bytes are ignored.
    fn from_slice(mut data: &[u8]) -> Result<Self, WireError> {
        Self::decode(&mut data)
    }
}

/// Fail with `Truncated` unless `buf` holds at least `needed` bytes.
pub fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<(), WireError> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(WireError::Truncated { needed, remaining });
    }
    Ok(())
}

fn put_len<B: BufMut>(buf: &mut B, len: usize) -> Result<(), WireError> {
    let len = u32::try_from(len).map_err(|_| WireError::LengthOverflow(len))?;
    buf.put_u32_le(len);
    Ok(())
}

fn get_len<B: Buf>(buf: &mut B) -> Result<usize, WireError> {
    Ok(u32::decode(buf)? as usize)
}

// ── Fixed-width values ────────────────────────────────────────────────────────

macro_rules! impl_wire_fixed {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Wire for $ty {
                fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
                    buf.$put(*self);
                    Ok(())
                }

                fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
                    ensure_remaining(buf, std::mem::size_of::<$ty>())?;
                    Ok(buf.$get())
                }
            }
        )*
    };
}

impl_wire_fixed! {
    u8  => put_u8, get_u8;
    i8  => put_i8, get_i8;
    u16 => put_u16_le, get_u16_le;
    i16 => put_i16_le, get_i16_le;
    u32 => put_u32_le, get_u32_le;
    i32 => put_i32_le, get_i32_le;
    u64 => put_u64_le, get_u64_le;
    i64 => put_i64_le, get_i64_le;
    f32 => put_f32_le, get_f32_le;
    f64 => put_f64_le, get_f64_le;
}

impl Wire for bool {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        match u8::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }
}

// ── Length-prefixed values ────────────────────────────────────────────────────

impl Wire for String {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        put_len(buf, self.len())?;
        buf.put_slice(self.as_bytes());
        Ok(())
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        let len = get_len(buf)?;
        ensure_remaining(buf, len)?;
        let raw = buf.copy_to_bytes(len);
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}

/// Raw payload bytes. Not required to be UTF-8.
impl Wire for Bytes {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        put_len(buf, self.len())?;
        buf.put_slice(&self[..]);
        Ok(())
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        let len = get_len(buf)?;
        ensure_remaining(buf, len)?;
        Ok(buf.copy_to_bytes(len))
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<(), WireError> {
        put_len(buf, self.len())?;
        for item in self {
            item.encode(buf)?;
        }
        Ok(())
    }

    fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        let count = get_len(buf)?;
        // Every element is at least one byte, so the remaining length bounds
        // the allocation regardless of what the count field claims.
        let mut items = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
