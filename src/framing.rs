//! Length-prefixed frame codec for the lock protocol.
//!
//! Every protocol message travels as one frame:
//!
//! ```text
//! [u32 LE payload length] [payload bytes]
//! ```
//!
//! The payload is an ASCII command line (see [`crate::protocol`]). The codec
//! itself is payload-agnostic: one complete frame in, one complete frame out.

use anyhow::{bail, Result};

/// Maximum frame payload size (1 MB).
///
/// Command lines are tiny; anything larger is a corrupted or hostile stream.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Size of the length header in bytes.
const HEADER_LEN: usize = 4;

/// Encode a payload into a wire-format frame.
///
/// Returns `[u32 LE length][payload]`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u32;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Incremental frame decoder that handles partial reads.
///
/// Bytes are appended with [`FrameDecoder::add_chunk`] and complete payloads
/// pulled out with [`FrameDecoder::read`]. [`FrameDecoder::feed`] does both
/// in one call. Handles TCP-style byte stream reassembly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append raw bytes from the stream.
    pub fn add_chunk(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame payload, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the length header is zero or exceeds
    /// [`MAX_FRAME_SIZE`]. The stream cannot be resynchronized after that.
    pub fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let length = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if length == 0 {
            bail!("Invalid frame: zero length");
        }
        if length > MAX_FRAME_SIZE {
            bail!("Frame too large: {length} bytes (max {MAX_FRAME_SIZE})");
        }

        let total = HEADER_LEN + length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(payload))
    }

    /// Feed bytes into the decoder and extract all complete frames.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame header is malformed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.add_chunk(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.read()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
