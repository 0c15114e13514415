//! ScriptLink frame codec.
//!
//! Wire layout:
//!
//! ```text
//! ┌────────┬─────────┬──────────┬──────────────┬─────────┬──────────┐
//! │ marker │ service │ sequence │ length (BE)  │ payload │ checksum │
//! │  0xAA  │   u8    │    u8    │     u32      │  bytes  │    u8    │
//! └────────┴─────────┴──────────┴──────────────┴─────────┴──────────┘
//! ```
//!
//! The checksum is the XOR of every byte from `service` through the end of
//! the payload. The decoder tolerates stray bytes before the marker
//! (discarding them), validates the declared length against
//! [`MAX_PAYLOAD_LEN`] before waiting on the payload, and only yields a
//! frame once the full payload and checksum have arrived. The decode loop
//! is idempotent: repeated partial deliveries never duplicate or drop a
//! logically complete frame.

use bytes::{Buf, BytesMut};
use std::io::Read;

use crate::error::ScriptLinkError;
use crate::types::{CHECKSUM_LEN, FRAME_MARKER, HEADER_LEN, MAX_PAYLOAD_LEN};

// =============================================================================
// Frame
// =============================================================================

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Service identifier.
    pub service: u8,
    /// Sequence number, echoed by the peer for correlation.
    pub sequence: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame.
    pub fn new(service: u8, sequence: u8, payload: Vec<u8>) -> Self {
        Self {
            service,
            sequence,
            payload,
        }
    }

    /// Encodes the frame for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        out.push(FRAME_MARKER);
        out.push(self.service);
        out.push(self.sequence);
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.push(checksum(&out[1..]));
        out
    }
}

/// XOR checksum over the given bytes.
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

// =============================================================================
// FrameDecoder
// =============================================================================

/// Incremental frame decoder over a growable receive buffer.
///
/// Feed raw socket bytes with [`extend`](Self::extend) and drain complete
/// frames with [`try_decode`](Self::try_decode). Framing errors reset the
/// buffer; the connection-level recovery (reconnect) is the caller's call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    discarded: u64,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode one complete frame.
    ///
    /// Returns `Ok(None)` while the buffer holds only a partial frame.
    ///
    /// # Errors
    ///
    /// [`ScriptLinkError::Oversize`] for a declared length beyond the hard
    /// maximum and [`ScriptLinkError::Checksum`] for a corrupt frame; both
    /// reset the buffer.
    pub fn try_decode(&mut self) -> Result<Option<Frame>, ScriptLinkError> {
        // Skip any stray preamble before the marker.
        match self.buf.iter().position(|&b| b == FRAME_MARKER) {
            Some(0) => {}
            Some(pos) => {
                self.discarded += pos as u64;
                self.buf.advance(pos);
            }
            None => {
                self.discarded += self.buf.len() as u64;
                self.buf.clear();
                return Ok(None);
            }
        }

        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let length =
            u32::from_be_bytes([self.buf[3], self.buf[4], self.buf[5], self.buf[6]]) as usize;
        if length > MAX_PAYLOAD_LEN {
            self.reset();
            return Err(ScriptLinkError::Oversize {
                length,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let total = HEADER_LEN + length + CHECKSUM_LEN;
        if self.buf.len() < total {
            return Ok(None);
        }

        let frame_bytes = self.buf.split_to(total);
        let expected = checksum(&frame_bytes[1..HEADER_LEN + length]);
        let actual = frame_bytes[total - 1];
        if expected != actual {
            self.reset();
            return Err(ScriptLinkError::Checksum { expected, actual });
        }

        Ok(Some(Frame {
            service: frame_bytes[1],
            sequence: frame_bytes[2],
            payload: frame_bytes[HEADER_LEN..HEADER_LEN + length].to_vec(),
        }))
    }

    /// Discards all buffered bytes.
    pub fn reset(&mut self) {
        self.discarded += self.buf.len() as u64;
        self.buf.clear();
    }

    /// Bytes currently buffered.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes discarded as garbage or during resets.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

// =============================================================================
// Payload decompression
// =============================================================================

/// Probes a payload for zlib compression.
///
/// Not all controllers compress, and the protocol does not negotiate it:
/// attempt a standard inflate and fall back to the payload as-is when it
/// is not a zlib stream.
pub fn inflate_probe(payload: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::ZlibDecoder::new(payload);
    let mut inflated = Vec::new();
    match decoder.read_to_end(&mut inflated) {
        Ok(_) => inflated,
        Err(_) => payload.to_vec(),
    }
}

// =============================================================================
// Tests
// =============================================================================
