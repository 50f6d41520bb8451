// Wire framing for envelopes.
//
// The in-memory transport moves envelopes as values; a real transport frames
// them as length-prefixed bincode with a CRC32 trailer. Frame layout:
// 4-byte big-endian payload length, payload, 4-byte big-endian CRC32 of the
// payload.

use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

use crate::error::{Result, SyncError};
use crate::protocol::Envelope;

/// Default cap on a single frame. Snapshots are bounded by store size, not
/// by the protocol, so oversized transfers fail loudly instead of silently.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const HEADER_SIZE: usize = 4;
const TRAILER_SIZE: usize = 4;

/// Encoder/decoder for envelope frames.
pub struct EnvelopeCodec {
    max_frame_size: usize,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Encodes an envelope into a framed byte buffer.
    pub fn encode(&self, envelope: &Envelope) -> Result<BytesMut> {
        let payload = bincode::serde::encode_to_vec(envelope, bincode::config::standard())?;
        if payload.len() > self.max_frame_size {
            return Err(SyncError::Serialization(format!(
                "frame of {} bytes exceeds cap of {}",
                payload.len(),
                self.max_frame_size
            )));
        }

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        buf.put_u32(payload.len() as u32);
        buf.put_slice(&payload);
        buf.put_u32(checksum);
        Ok(buf)
    }

    /// Decodes one framed envelope from the front of `buf`. Returns `None`
    /// when the buffer does not yet hold a complete frame.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Envelope>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if length > self.max_frame_size {
            return Err(SyncError::Serialization(format!(
                "frame of {} bytes exceeds cap of {}",
                length, self.max_frame_size
            )));
        }
        if buf.len() < HEADER_SIZE + length + TRAILER_SIZE {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let payload = buf.split_to(length);
        let declared = buf.get_u32();

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let actual = hasher.finalize();
        if actual != declared {
            return Err(SyncError::Serialization(format!(
                "frame checksum mismatch: declared {:#010x}, computed {:#010x}",
                declared, actual
            )));
        }

        let (envelope, consumed) =
            bincode::serde::decode_from_slice(&payload, bincode::config::standard())?;
        if consumed != payload.len() {
            return Err(SyncError::Serialization(
                "trailing bytes after envelope payload".to_string(),
            ));
        }
        Ok(Some(envelope))
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}
