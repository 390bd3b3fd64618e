//! Holdfast wire protocol.
//!
//! Length-prefixed binary frames over TCP. Each frame is a fixed 13-byte
//! little-endian header followed by a per-class payload. The header alone
//! carries everything the dispatcher needs for routing: the packet class
//! (`magic`), the operation (`opcode`), the transform flags, and the client's
//! correlation token (`sequence_id`).
//!
//! # Components
//!
//! - [`FrameHeader`]: fixed header with zero-copy parsing
//! - [`Frame`]: header + raw payload bytes (transport layer)
//! - [`Packet`]: tagged union over the five packet classes
//! - [`directive`]: server→client control vocabulary
//!
//! The codec is pure. It never allocates outside the output buffer and never
//! touches session keys; encryption and compression of payload fields are
//! applied by the pipeline stages that own the keys.

#![forbid(unsafe_code)]

mod errors;
mod frame;
mod header;
mod wire;

pub mod directive;
pub mod packet;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use packet::Packet;

/// Packet-class identifiers.
///
/// Each class has a 32-bit magic built from a four-byte ASCII tag. The magic
/// catalog is the source of truth for frame validation: a header whose magic
/// is not listed here is rejected as [`ProtocolError::BadMagic`] before its
/// payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketMagic {
    /// Ephemeral key exchange (both directions), tag `HSHK`.
    Handshake,
    /// Username + password submission (client→server), tag `CRED`.
    Credentials,
    /// Old + new password submission (client→server), tag `CPWD`.
    CredsUpdate,
    /// Control reply (server→client), tag `DRCT`.
    Directive,
    /// Single status byte reply (server→client), tag `RESP`.
    Response,
}

impl PacketMagic {
    /// All registered packet classes.
    pub const CATALOG: [Self; 5] =
        [Self::Handshake, Self::Credentials, Self::CredsUpdate, Self::Directive, Self::Response];

    /// Magic as the u32 that appears on the wire.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        let tag: &[u8; 4] = match self {
            Self::Handshake => b"HSHK",
            Self::Credentials => b"CRED",
            Self::CredsUpdate => b"CPWD",
            Self::Directive => b"DRCT",
            Self::Response => b"RESP",
        };
        u32::from_le_bytes(*tag)
    }

    /// Look up a wire magic in the catalog. `None` if unregistered.
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::CATALOG.into_iter().find(|magic| magic.to_u32() == value)
    }
}

/// Operation codes.
///
/// A 16-bit identifier, unique per handler. `None` (0) is the quiescent value
/// pooled packets are reset to; it never appears in a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Reset value for pooled packets; never dispatched.
    None = 0x0000,
    /// Ephemeral Diffie–Hellman key exchange.
    Handshake = 0x0001,
    /// Account creation.
    Register = 0x0002,
    /// Credential verification and session elevation.
    Login = 0x0003,
    /// Session teardown.
    Logout = 0x0004,
    /// Credential rotation.
    ChangePassword = 0x0005,
}

impl Opcode {
    /// Opcode as the u16 that appears on the wire.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire opcode. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::None),
            0x0001 => Some(Self::Handshake),
            0x0002 => Some(Self::Register),
            0x0003 => Some(Self::Login),
            0x0004 => Some(Self::Logout),
            0x0005 => Some(Self::ChangePassword),
            _ => None,
        }
    }
}

/// Frame transform flags.
///
/// Bit 0 marks string payload fields as sealed with the session key; bit 1
/// marks the payload as DEFLATE-compressed. The remaining bits are reserved:
/// decoding preserves them, this implementation never sets them.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Bit 0: string payload fields are sealed with the session key.
    pub const ENCRYPTED: u8 = 0b0000_0001;
    /// Bit 1: payload is DEFLATE-compressed.
    pub const COMPRESSED: u8 = 0b0000_0010;

    /// Wrap a raw flag byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Flag byte as it appears on the wire.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether the ENCRYPTED bit is set.
    #[must_use]
    pub fn encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    /// Whether the COMPRESSED bit is set.
    #[must_use]
    pub fn compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    /// Return a copy with the ENCRYPTED bit set or cleared.
    #[must_use]
    pub fn with_encrypted(self, on: bool) -> Self {
        if on { Self(self.0 | Self::ENCRYPTED) } else { Self(self.0 & !Self::ENCRYPTED) }
    }

    /// Return a copy with the COMPRESSED bit set or cleared.
    #[must_use]
    pub fn with_compressed(self, on: bool) -> Self {
        if on { Self(self.0 | Self::COMPRESSED) } else { Self(self.0 & !Self::COMPRESSED) }
    }
}

impl std::fmt::Debug for FrameFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameFlags")
            .field("encrypted", &self.encrypted())
            .field("compressed", &self.compressed())
            .field("raw", &format!("{:#04x}", self.0))
            .finish()
    }
}
