//! Typed packets over the frame layer.
//!
//! A [`Packet`] is one decoded frame: the routing fields lifted out of the
//! header plus a [`Body`] tagged union dispatched on the frame's magic. Body
//! layouts are fixed binary (no self-describing envelope); the magic alone
//! determines how the payload parses, so a mismatched magic/body pair cannot
//! be expressed.
//!
//! # Invariants
//!
//! - Each body variant maps to exactly one [`PacketMagic`].
//! - Round-trip encoding must produce identical values (verified by property
//!   tests).

use bytes::Bytes;
use zeroize::Zeroize;

use crate::{
    Frame, FrameFlags, FrameHeader, Opcode, PacketMagic,
    directive::{Advice, ControlType, Directive, DirectiveFlags, Reason},
    errors::{ProtocolError, Result},
    wire,
};

/// Raw X25519 public key length carried by handshake packets.
pub const PUBLIC_KEY_LEN: usize = 32;

/// One decoded frame: routing fields plus the class-tagged body.
///
/// `opcode` stays a raw `u16` here; whether it names a registered handler is
/// the dispatcher's question, not the codec's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    /// Operation code from the header.
    pub opcode: u16,
    /// Transform flags from the header.
    pub flags: FrameFlags,
    /// Correlation token from the header.
    pub sequence_id: u32,
    /// Class-tagged body.
    pub body: Body,
}

/// Packet body, tagged by packet class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Ephemeral key exchange.
    Handshake(HandshakePacket),
    /// Username + password submission.
    Credentials(CredentialsPacket),
    /// Old + new password submission.
    CredsUpdate(CredsUpdatePacket),
    /// Server→client control reply.
    Directive(DirectiveBody),
    /// Server→client status byte.
    Response(ResponsePacket),
}

impl Default for Body {
    fn default() -> Self {
        Self::Handshake(HandshakePacket::default())
    }
}

/// Handshake body: the peer's raw X25519 public key.
///
/// Kept as raw bytes rather than a fixed array: the handshake operation owns
/// the length validation so it can answer an empty payload with
/// `MISSING_REQUIRED_FIELD` and a mis-sized one with `VALIDATION_FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakePacket {
    /// Raw public key bytes (expected [`PUBLIC_KEY_LEN`]).
    pub public_key: Vec<u8>,
}

/// Credentials body: username and password.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialsPacket {
    /// Account name (≤ 20 bytes once unsealed).
    pub username: String,
    /// Password (≤ 128 bytes once unsealed).
    pub password: String,
}

/// Credential-rotation body: current and replacement password.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredsUpdatePacket {
    /// Password being replaced.
    pub current_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// Directive body: the four control bytes (the correlation token rides in the
/// frame header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveBody {
    /// Control type.
    pub control: ControlType,
    /// Failure reason.
    pub reason: Reason,
    /// Retry advice.
    pub advice: Advice,
    /// Qualifier flags.
    pub flags: DirectiveFlags,
}

impl Default for DirectiveBody {
    fn default() -> Self {
        Self {
            control: ControlType::Ack,
            reason: Reason::None,
            advice: Advice::None,
            flags: DirectiveFlags::default(),
        }
    }
}

/// Response body: a single status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponsePacket {
    /// Operation-specific status code.
    pub status: u8,
}

impl HandshakePacket {
    /// Zero and drop the key bytes.
    pub fn reset(&mut self) {
        self.public_key.zeroize();
        self.public_key.clear();
    }
}

impl CredentialsPacket {
    /// Zero and drop both fields.
    pub fn reset(&mut self) {
        self.username.zeroize();
        self.password.zeroize();
    }
}

impl CredsUpdatePacket {
    /// Zero and drop both fields.
    pub fn reset(&mut self) {
        self.current_password.zeroize();
        self.new_password.zeroize();
    }
}

impl DirectiveBody {
    /// Restore the quiescent ACK/NONE state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl ResponsePacket {
    /// Restore the zero status.
    pub fn reset(&mut self) {
        self.status = 0;
    }
}

impl Body {
    /// The packet class this body belongs to.
    #[must_use]
    pub fn magic(&self) -> PacketMagic {
        match self {
            Self::Handshake(_) => PacketMagic::Handshake,
            Self::Credentials(_) => PacketMagic::Credentials,
            Self::CredsUpdate(_) => PacketMagic::CredsUpdate,
            Self::Directive(_) => PacketMagic::Directive,
            Self::Response(_) => PacketMagic::Response,
        }
    }

    /// Zero the payload fields in place.
    pub fn reset(&mut self) {
        match self {
            Self::Handshake(body) => body.reset(),
            Self::Credentials(body) => body.reset(),
            Self::CredsUpdate(body) => body.reset(),
            Self::Directive(body) => body.reset(),
            Self::Response(body) => body.reset(),
        }
    }

    fn wire_len(&self) -> usize {
        match self {
            Self::Handshake(body) => body.public_key.len(),
            Self::Credentials(body) => {
                wire::string_wire_len(&body.username) + wire::string_wire_len(&body.password)
            },
            Self::CredsUpdate(body) => {
                wire::string_wire_len(&body.current_password)
                    + wire::string_wire_len(&body.new_password)
            },
            Self::Directive(_) => 4,
            Self::Response(_) => 1,
        }
    }

    fn parse(magic: PacketMagic, payload: &[u8]) -> Result<Self> {
        match magic {
            PacketMagic::Handshake => {
                Ok(Self::Handshake(HandshakePacket { public_key: payload.to_vec() }))
            },

            PacketMagic::Credentials => {
                let mut cursor = payload;
                let username = wire::read_string(&mut cursor, "credentials")?;
                let password = wire::read_string(&mut cursor, "credentials")?;
                if !cursor.is_empty() {
                    return Err(ProtocolError::Malformed {
                        what: "credentials",
                        reason: "trailing bytes",
                    });
                }
                Ok(Self::Credentials(CredentialsPacket { username, password }))
            },

            PacketMagic::CredsUpdate => {
                let mut cursor = payload;
                let current_password = wire::read_string(&mut cursor, "creds-update")?;
                let new_password = wire::read_string(&mut cursor, "creds-update")?;
                if !cursor.is_empty() {
                    return Err(ProtocolError::Malformed {
                        what: "creds-update",
                        reason: "trailing bytes",
                    });
                }
                Ok(Self::CredsUpdate(CredsUpdatePacket { current_password, new_password }))
            },

            PacketMagic::Directive => {
                let [control, reason, advice, flags] = payload else {
                    return Err(ProtocolError::Malformed {
                        what: "directive",
                        reason: "payload is not 4 bytes",
                    });
                };

                Ok(Self::Directive(DirectiveBody {
                    control: ControlType::from_u8(*control).ok_or(ProtocolError::Malformed {
                        what: "directive",
                        reason: "unknown control type",
                    })?,
                    reason: Reason::from_u8(*reason).ok_or(ProtocolError::Malformed {
                        what: "directive",
                        reason: "unknown reason",
                    })?,
                    advice: Advice::from_u8(*advice).ok_or(ProtocolError::Malformed {
                        what: "directive",
                        reason: "unknown advice",
                    })?,
                    flags: DirectiveFlags::from_byte(*flags),
                }))
            },

            PacketMagic::Response => {
                let [status] = payload else {
                    return Err(ProtocolError::Malformed {
                        what: "response",
                        reason: "payload is not 1 byte",
                    });
                };
                Ok(Self::Response(ResponsePacket { status: *status }))
            },
        }
    }

    fn write(&self, dst: &mut [u8], offset: usize) -> Result<usize> {
        match self {
            Self::Handshake(body) => {
                let end = offset + body.public_key.len();
                let Some(span) = dst.get_mut(offset..end) else {
                    return Err(ProtocolError::BufferTooSmall {
                        needed: end,
                        available: dst.len(),
                    });
                };
                span.copy_from_slice(&body.public_key);
                Ok(end)
            },

            Self::Credentials(body) => {
                let offset = wire::write_string(dst, offset, &body.username)?;
                wire::write_string(dst, offset, &body.password)
            },

            Self::CredsUpdate(body) => {
                let offset = wire::write_string(dst, offset, &body.current_password)?;
                wire::write_string(dst, offset, &body.new_password)
            },

            Self::Directive(body) => {
                let end = offset + 4;
                let Some(span) = dst.get_mut(offset..end) else {
                    return Err(ProtocolError::BufferTooSmall {
                        needed: end,
                        available: dst.len(),
                    });
                };
                span[0] = body.control as u8;
                span[1] = body.reason as u8;
                span[2] = body.advice as u8;
                span[3] = body.flags.to_byte();
                Ok(end)
            },

            Self::Response(body) => {
                let end = offset + 1;
                let Some(span) = dst.get_mut(offset..end) else {
                    return Err(ProtocolError::BufferTooSmall {
                        needed: end,
                        available: dst.len(),
                    });
                };
                span[0] = body.status;
                Ok(end)
            },
        }
    }
}

impl Packet {
    /// Parse the body of a decoded frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if the payload does not parse as the
    ///   body its magic claims
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        // Frame::decode validated the magic against the catalog already; a
        // hand-built Frame with a rogue header fails the same way.
        let magic = frame.header.magic_enum().ok_or(ProtocolError::BadMagic {
            magic: frame.header.magic(),
        })?;

        Ok(Self {
            opcode: frame.header.opcode(),
            flags: frame.header.flags(),
            sequence_id: frame.header.sequence_id(),
            body: Body::parse(magic, &frame.payload)?,
        })
    }

    /// Build a directive packet. The reply opcode echoes the request's.
    #[must_use]
    pub fn from_directive(directive: Directive, opcode: u16) -> Self {
        Self {
            opcode,
            flags: FrameFlags::default(),
            sequence_id: directive.sequence_id,
            body: Body::Directive(DirectiveBody {
                control: directive.control,
                reason: directive.reason,
                advice: directive.advice,
                flags: directive.flags,
            }),
        }
    }

    /// Total bytes this packet occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FrameHeader::SIZE + self.body.wire_len()
    }

    /// Serialize header and body into a caller-provided span, returning
    /// bytes written.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::BufferTooSmall`] if `dst` cannot hold the frame
    /// - [`ProtocolError::BadLength`] if the body exceeds the frame ceiling
    pub fn encode_into(&self, dst: &mut [u8]) -> Result<usize> {
        let body_len = self.body.wire_len();
        if body_len > Frame::MAX_PAYLOAD {
            return Err(ProtocolError::BadLength { length: u16::MAX, header: FrameHeader::SIZE });
        }

        let total = FrameHeader::SIZE + body_len;
        if dst.len() < total {
            return Err(ProtocolError::BufferTooSmall { needed: total, available: dst.len() });
        }

        let mut header = FrameHeader::new(self.body.magic());
        header.set_length(total as u16);
        header.set_opcode(self.opcode);
        header.set_flags(self.flags);
        header.set_sequence_id(self.sequence_id);
        dst[..FrameHeader::SIZE].copy_from_slice(&header.to_bytes());

        let end = self.body.write(dst, FrameHeader::SIZE)?;
        debug_assert_eq!(end, total);

        Ok(total)
    }

    /// Serialize into an owned [`Frame`].
    pub fn to_frame(&self) -> Result<Frame> {
        let mut buf = vec![0u8; self.wire_len()];
        self.encode_into(&mut buf)?;
        Frame::decode(&buf)
    }

    /// The string fields the cipher stage seals/unseals for this class.
    ///
    /// This is the per-class descriptor the pipeline iterates: credential
    /// packets expose both fields, everything else exposes none.
    pub fn sealed_fields_mut(&mut self) -> Vec<&mut String> {
        match &mut self.body {
            Body::Credentials(body) => vec![&mut body.username, &mut body.password],
            Body::CredsUpdate(body) => vec![&mut body.current_password, &mut body.new_password],
            Body::Handshake(_) | Body::Directive(_) | Body::Response(_) => Vec::new(),
        }
    }

    /// Zero payload fields and restore the quiescent routing state
    /// (opcode back to [`Opcode::None`]).
    pub fn reset(&mut self) {
        self.opcode = Opcode::None.to_u16();
        self.flags = FrameFlags::default();
        self.sequence_id = 0;
        self.body.reset();
    }
}

/// Build the wire bytes for a packet in one allocation.
///
/// Convenience over [`Packet::encode_into`] for senders that need an owned
/// buffer for a socket write.
pub fn encode_to_bytes(packet: &Packet) -> Result<Bytes> {
    let mut buf = vec![0u8; packet.wire_len()];
    let written = packet.encode_into(&mut buf)?;
    debug_assert_eq!(written, buf.len());
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: &Packet) -> Packet {
        let frame = packet.to_frame().expect("encode");
        Packet::from_frame(&frame).expect("parse")
    }

    #[test]
    fn credentials_round_trip() {
        let packet = Packet {
            opcode: Opcode::Login.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: 99,
            body: Body::Credentials(CredentialsPacket {
                username: "alice".into(),
                password: "Str0ng!Pass".into(),
            }),
        };

        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn handshake_round_trip() {
        let packet = Packet {
            opcode: Opcode::Handshake.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: 1,
            body: Body::Handshake(HandshakePacket { public_key: vec![0x01; PUBLIC_KEY_LEN] }),
        };

        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn directive_round_trip() {
        let directive =
            Directive::error(Reason::AccountLocked, Advice::BackoffRetry, 7).auth_related();
        let packet = Packet::from_directive(directive, Opcode::Login.to_u16());

        let parsed = round_trip(&packet);
        let Body::Directive(body) = parsed.body else {
            unreachable!("directive frames parse as directives");
        };
        assert_eq!(body.control, ControlType::Error);
        assert_eq!(body.reason, Reason::AccountLocked);
        assert_eq!(body.advice, Advice::BackoffRetry);
        assert!(body.flags.is_auth_related());
        assert_eq!(parsed.sequence_id, 7);
    }

    #[test]
    fn credentials_trailing_bytes_rejected() {
        let packet = Packet {
            opcode: Opcode::Login.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: 0,
            body: Body::Credentials(CredentialsPacket {
                username: "bob".into(),
                password: "pw".into(),
            }),
        };

        let mut frame = packet.to_frame().expect("encode");
        let mut payload = frame.payload.to_vec();
        payload.push(0xFF);
        frame = Frame::new(frame.header, payload).expect("fits");

        let err = Packet::from_frame(&frame).expect_err("should reject");
        assert!(matches!(err, ProtocolError::Malformed { reason: "trailing bytes", .. }));
    }

    #[test]
    fn directive_bad_enum_rejected() {
        let header = FrameHeader::new(PacketMagic::Directive);
        let frame = Frame::new(header, vec![0x09, 0, 0, 0]).expect("fits");

        let err = Packet::from_frame(&frame).expect_err("should reject");
        assert!(matches!(err, ProtocolError::Malformed { reason: "unknown control type", .. }));
    }

    #[test]
    fn reset_restores_quiescent_state() {
        let mut packet = Packet {
            opcode: Opcode::Login.to_u16(),
            flags: FrameFlags::default().with_encrypted(true),
            sequence_id: 12,
            body: Body::Credentials(CredentialsPacket {
                username: "alice".into(),
                password: "hunter2".into(),
            }),
        };

        packet.reset();

        assert_eq!(packet.opcode, Opcode::None.to_u16());
        assert_eq!(packet.sequence_id, 0);
        assert!(!packet.flags.encrypted());
        let Body::Credentials(body) = &packet.body else {
            unreachable!("reset preserves the class");
        };
        assert!(body.username.is_empty());
        assert!(body.password.is_empty());
    }

    #[test]
    fn sealed_fields_per_class() {
        let mut creds = Packet {
            body: Body::Credentials(CredentialsPacket::default()),
            ..Packet::default()
        };
        assert_eq!(creds.sealed_fields_mut().len(), 2);

        let mut shake = Packet::default();
        assert!(shake.sealed_fields_mut().is_empty());

        let mut resp =
            Packet { body: Body::Response(ResponsePacket { status: 1 }), ..Packet::default() };
        assert!(resp.sealed_fields_mut().is_empty());
    }

    #[test]
    fn empty_handshake_parses_as_missing_key() {
        let header = FrameHeader::new(PacketMagic::Handshake);
        let frame = Frame::new(header, Vec::new()).expect("fits");

        let packet = Packet::from_frame(&frame).expect("parse");
        let Body::Handshake(body) = packet.body else {
            unreachable!("handshake frames parse as handshakes");
        };
        assert!(body.public_key.is_empty());
    }
}
