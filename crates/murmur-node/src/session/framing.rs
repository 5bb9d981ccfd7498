//! TCP frame codec.
//!
//! ```text
//! +----------------------+------------------+
//! | Length (u32 LE)      | Body (N bytes)   |
//! +----------------------+------------------+
//! ```
//!
//! The body is one encoded `TcpMessage`. A declared length above the
//! configured maximum is a protocol error and closes the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use murmur_core::wire::{FRAME_HEADER_LEN, MAX_FRAME_BYTES};

use crate::error::SessionError;

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame: u32,
}

impl FrameCodec {
    pub fn new(max_frame: u32) -> Self {
        Self { max_frame }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = SessionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, SessionError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        // Peek, don't consume, until the whole frame is buffered.
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&src[..FRAME_HEADER_LEN]);
        let length = u32::from_le_bytes(header);

        if length > self.max_frame {
            return Err(SessionError::FrameTooLarge {
                size: length as usize,
                max: self.max_frame,
            });
        }

        let total = FRAME_HEADER_LEN + length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        Ok(Some(src.split_to(length as usize)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = SessionError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), SessionError> {
        if body.len() > self.max_frame as usize {
            return Err(SessionError::FrameTooLarge {
                size: body.len(),
                max: self.max_frame,
            });
        }
        dst.reserve(FRAME_HEADER_LEN + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
