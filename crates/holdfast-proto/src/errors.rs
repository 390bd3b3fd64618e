//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by the frame codec and packet parsers.
///
/// `Incomplete` is the only non-fatal variant: the framing buffer does not
/// yet hold a full frame and the caller should read more bytes. Every other
/// variant is fatal for the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not enough bytes buffered to decode one complete frame.
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete {
        /// Bytes required for the next decode step.
        needed: usize,
        /// Bytes currently available.
        available: usize,
    },

    /// The magic field does not identify any registered packet class.
    #[error("unknown packet magic {magic:#010x}")]
    BadMagic {
        /// The rejected magic value.
        magic: u32,
    },

    /// The length field violates the frame size invariant.
    #[error("bad frame length {length} (header is {header} bytes)")]
    BadLength {
        /// The rejected length value.
        length: u16,
        /// Size of the fixed header.
        header: usize,
    },

    /// The payload does not parse as the body its magic claims.
    #[error("malformed {what} payload: {reason}")]
    Malformed {
        /// Packet class being parsed.
        what: &'static str,
        /// What went wrong.
        reason: &'static str,
    },

    /// The caller-provided output span cannot hold the encoded frame.
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes the encoded frame occupies.
        needed: usize,
        /// Bytes the caller provided.
        available: usize,
    },
}

impl ProtocolError {
    /// Whether this error means "read more bytes and retry".
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}
