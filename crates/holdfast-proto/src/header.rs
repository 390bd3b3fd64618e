//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 13-byte structure serialized as raw binary
//! (little-endian). Routing decisions (magic class, opcode, flags) are made
//! from the header alone, before the payload is touched.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    FrameFlags, PacketMagic,
    errors::{ProtocolError, Result},
};

/// Fixed 13-byte frame header (little-endian byte order).
///
/// All multi-byte integers are little-endian. Fields are stored as raw byte
/// arrays to avoid alignment issues.
///
/// Wire layout: `magic(4) | length(2) | opcode(2) | flags(1) | sequence_id(4)`.
///
/// # Invariants
///
/// - `length` counts the whole frame including this header:
///   `SIZE <= length <= u16::MAX`.
/// - `magic` identifies a registered packet class; [`FrameHeader::from_bytes`]
///   rejects anything outside the catalog before the payload is read.
///
/// # Security
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this struct
/// can be safely cast from untrusted network bytes: every 13-byte pattern is
/// a valid bit pattern, so the cast itself cannot cause undefined behavior.
/// Semantic validation (magic catalog, length bounds) happens immediately
/// after the cast.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    /// u32 packet-class identifier
    magic: [u8; 4],
    /// u16 total frame length including header
    pub(crate) length: [u8; 2],
    /// u16 operation code
    pub(crate) opcode: [u8; 2],
    /// Flag bitset (`FrameFlags`)
    flags: u8,
    /// u32 client-chosen correlation token
    sequence_id: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header (13 bytes).
    pub const SIZE: usize = 13;

    /// Maximum total frame length (64 KiB − 1, the u16 ceiling).
    pub const MAX_FRAME_SIZE: u16 = u16::MAX;

    /// Create a header for the given packet class.
    ///
    /// `length` starts at `SIZE` (empty payload) and is finalized by the
    /// frame encoder once the payload size is known.
    #[must_use]
    pub fn new(magic: PacketMagic) -> Self {
        Self {
            magic: magic.to_u32().to_le_bytes(),
            length: (Self::SIZE as u16).to_le_bytes(),
            opcode: [0, 0],
            flags: 0,
            sequence_id: [0, 0, 0, 0],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Incomplete`] if fewer than 13 bytes are available
    /// - [`ProtocolError::BadMagic`] if the magic is not in the catalog
    /// - [`ProtocolError::BadLength`] if `length < SIZE`
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Incomplete { needed: Self::SIZE, available: bytes.len() })?
            .0;

        let magic = u32::from_le_bytes(header.magic);
        if PacketMagic::from_u32(magic).is_none() {
            return Err(ProtocolError::BadMagic { magic });
        }

        let length = u16::from_le_bytes(header.length);
        if (length as usize) < Self::SIZE {
            return Err(ProtocolError::BadLength { length, header: Self::SIZE });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Packet-class magic as raw u32.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_le_bytes(self.magic)
    }

    /// Packet-class magic as enum. `None` if unregistered.
    #[must_use]
    pub fn magic_enum(&self) -> Option<PacketMagic> {
        PacketMagic::from_u32(self.magic())
    }

    /// Total frame length including header.
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from_le_bytes(self.length)
    }

    /// Payload length (total minus header).
    #[must_use]
    pub fn payload_len(&self) -> usize {
        (self.length() as usize).saturating_sub(Self::SIZE)
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_le_bytes(self.opcode)
    }

    /// Frame processing flags (encryption, compression).
    #[must_use]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Client-chosen correlation token, echoed in the matching directive.
    #[must_use]
    pub fn sequence_id(&self) -> u32 {
        u32::from_le_bytes(self.sequence_id)
    }

    /// Set the total frame length.
    pub fn set_length(&mut self, length: u16) {
        self.length = length.to_le_bytes();
    }

    /// Set the operation code.
    pub fn set_opcode(&mut self, opcode: u16) {
        self.opcode = opcode.to_le_bytes();
    }

    /// Update the flag bitset.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.to_byte();
    }

    /// Set the correlation token.
    pub fn set_sequence_id(&mut self, sequence_id: u32) {
        self.sequence_id = sequence_id.to_le_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("length", &self.length())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("flags", &self.flags())
            .field("sequence_id", &self.sequence_id())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
