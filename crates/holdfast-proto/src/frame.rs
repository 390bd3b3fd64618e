//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet: a 13-byte little-endian header
//! followed by a variable-length payload. This is a pure data holder; for
//! typed bodies see [`crate::Packet`].

use bytes::Bytes;

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame (transport layer).
///
/// Layout on the wire: `[FrameHeader: 13 bytes] + [payload: variable]`.
///
/// Holds raw payload bytes, not the parsed body, so the read loop can frame
/// and route without parsing. Parsing (and the flag-driven transforms) happen
/// later in the pipeline.
///
/// # Invariants
///
/// - Size consistency: `header.length() == HEADER_SIZE + payload.len()`,
///   enforced by [`Frame::new`] and verified by [`Frame::decode`].
/// - Size limit: a frame never exceeds `u16::MAX` bytes total; oversized
///   payloads are rejected during construction and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (13 bytes).
    pub header: FrameHeader,

    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Largest payload a frame can carry.
    pub const MAX_PAYLOAD: usize = u16::MAX as usize - FrameHeader::SIZE;

    /// Create a frame, finalizing the header's length field.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::BadLength`] if the payload exceeds
    ///   [`Frame::MAX_PAYLOAD`]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > Self::MAX_PAYLOAD {
            return Err(ProtocolError::BadLength { length: u16::MAX, header: FrameHeader::SIZE });
        }

        header.set_length((FrameHeader::SIZE + payload.len()) as u16);

        debug_assert_eq!(header.payload_len(), payload.len());

        Ok(Self { header, payload })
    }

    /// Decode exactly one frame from the front of a byte buffer.
    ///
    /// The caller advances its framing buffer by [`Frame::wire_len`] on
    /// success. Trailing bytes beyond one frame are ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Incomplete`] if the buffer holds less than one full
    ///   frame (read more and retry; no state changed)
    /// - [`ProtocolError::BadMagic`] / [`ProtocolError::BadLength`] if the
    ///   header is invalid (fatal for the connection)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;

        let total = header.length() as usize;
        debug_assert!(total >= FrameHeader::SIZE);

        if bytes.len() < total {
            return Err(ProtocolError::Incomplete { needed: total, available: bytes.len() });
        }

        // INVARIANT: FrameHeader::from_bytes validated length >= SIZE and we
        // checked bytes.len() >= total, so this slice cannot be out of range.
        let payload = Bytes::copy_from_slice(
            bytes
                .get(FrameHeader::SIZE..total)
                .ok_or(ProtocolError::Incomplete { needed: total, available: bytes.len() })?,
        );

        debug_assert_eq!(payload.len(), header.payload_len());

        Ok(Self { header, payload })
    }

    /// Total bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Serialize into a caller-provided span, returning bytes written.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::BadLength`] if the payload exceeds
    ///   [`Frame::MAX_PAYLOAD`]
    /// - [`ProtocolError::BufferTooSmall`] if `dst` cannot hold the frame
    pub fn encode_into(&self, dst: &mut [u8]) -> Result<usize> {
        debug_assert_eq!(self.payload.len(), self.header.payload_len());

        if self.payload.len() > Self::MAX_PAYLOAD {
            return Err(ProtocolError::BadLength { length: u16::MAX, header: FrameHeader::SIZE });
        }

        let total = self.wire_len();
        let Some(span) = dst.get_mut(..total) else {
            return Err(ProtocolError::BufferTooSmall { needed: total, available: dst.len() });
        };

        span[..FrameHeader::SIZE].copy_from_slice(&self.header.to_bytes());
        span[FrameHeader::SIZE..].copy_from_slice(&self.payload);

        Ok(total)
    }
}
