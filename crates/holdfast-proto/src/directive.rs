//! Server→client control vocabulary.
//!
//! A directive is the single control reply every operation produces on its
//! failure paths (and for ACK-style successes): a control type, a reason, a
//! piece of retry advice, and two qualifier flags, correlated to the request
//! by the echoed `sequence_id` in the frame header.

/// Control type carried in byte 0 of a directive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlType {
    /// Operation succeeded.
    Ack = 0,
    /// Operation failed; see the reason and advice.
    Error = 1,
    /// The server is closing this connection.
    Disconnect = 2,
}

impl ControlType {
    /// Parse a wire byte. `None` if out of range.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ack),
            1 => Some(Self::Error),
            2 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Failure reason carried in byte 1 of a directive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)] // variant names are the vocabulary
pub enum Reason {
    None = 0,
    UnsupportedPacket = 1,
    ValidationFailed = 2,
    InvalidUsername = 3,
    WeakPassword = 4,
    Unauthenticated = 5,
    AccountLocked = 6,
    AccountSuspended = 7,
    AlreadyExists = 8,
    SessionNotFound = 9,
    MissingRequiredField = 10,
    RateLimited = 11,
    ConcurrencyExceeded = 12,
    NotEncrypted = 13,
    Timeout = 14,
    Cancelled = 15,
    Backpressure = 16,
    ClientQuit = 17,
    InternalError = 18,
}

impl Reason {
    /// Parse a wire byte. `None` if out of range.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::UnsupportedPacket),
            2 => Some(Self::ValidationFailed),
            3 => Some(Self::InvalidUsername),
            4 => Some(Self::WeakPassword),
            5 => Some(Self::Unauthenticated),
            6 => Some(Self::AccountLocked),
            7 => Some(Self::AccountSuspended),
            8 => Some(Self::AlreadyExists),
            9 => Some(Self::SessionNotFound),
            10 => Some(Self::MissingRequiredField),
            11 => Some(Self::RateLimited),
            12 => Some(Self::ConcurrencyExceeded),
            13 => Some(Self::NotEncrypted),
            14 => Some(Self::Timeout),
            15 => Some(Self::Cancelled),
            16 => Some(Self::Backpressure),
            17 => Some(Self::ClientQuit),
            18 => Some(Self::InternalError),
            _ => None,
        }
    }
}

/// Retry advice carried in byte 2 of a directive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Advice {
    /// No advice.
    None = 0,
    /// Retrying will not help.
    DoNotRetry = 1,
    /// Correct the request and retry.
    FixAndRetry = 2,
    /// Re-establish credentials, then retry.
    Reauthenticate = 3,
    /// Back off and retry later.
    BackoffRetry = 4,
}

impl Advice {
    /// Parse a wire byte. `None` if out of range.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::DoNotRetry),
            2 => Some(Self::FixAndRetry),
            3 => Some(Self::Reauthenticate),
            4 => Some(Self::BackoffRetry),
            _ => None,
        }
    }
}

/// Qualifier bitset carried in byte 3 of a directive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectiveFlags(u8);

impl DirectiveFlags {
    /// The condition is expected to clear on its own.
    pub const IS_TRANSIENT: u8 = 0b0000_0001;
    /// The condition concerns authentication state.
    pub const IS_AUTH_RELATED: u8 = 0b0000_0010;

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

    /// Whether the transient bit is set.
    #[must_use]
    pub fn is_transient(self) -> bool {
        self.0 & Self::IS_TRANSIENT != 0
    }

    /// Whether the auth-related bit is set.
    #[must_use]
    pub fn is_auth_related(self) -> bool {
        self.0 & Self::IS_AUTH_RELATED != 0
    }

    /// Return a copy with the transient bit set.
    #[must_use]
    pub fn transient(self) -> Self {
        Self(self.0 | Self::IS_TRANSIENT)
    }

    /// Return a copy with the auth-related bit set.
    #[must_use]
    pub fn auth_related(self) -> Self {
        Self(self.0 | Self::IS_AUTH_RELATED)
    }
}

/// Decoded directive payload.
///
/// Constructors cover the recurring shapes so call sites read as policy:
/// `Directive::ack(seq)`, `Directive::error(reason, advice, seq)`, qualified
/// with [`Directive::transient`] / [`Directive::auth_related`] as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    /// Control type (ACK / ERROR / DISCONNECT).
    pub control: ControlType,
    /// Failure reason (NONE for ACK).
    pub reason: Reason,
    /// Retry advice.
    pub advice: Advice,
    /// Qualifier flags.
    pub flags: DirectiveFlags,
    /// Correlation token echoed from the request (0 if it carried none).
    pub sequence_id: u32,
}

impl Directive {
    /// Successful completion, correlated to `sequence_id`.
    #[must_use]
    pub fn ack(sequence_id: u32) -> Self {
        Self {
            control: ControlType::Ack,
            reason: Reason::None,
            advice: Advice::None,
            flags: DirectiveFlags::default(),
            sequence_id,
        }
    }

    /// Failure with a reason and retry advice.
    #[must_use]
    pub fn error(reason: Reason, advice: Advice, sequence_id: u32) -> Self {
        Self {
            control: ControlType::Error,
            reason,
            advice,
            flags: DirectiveFlags::default(),
            sequence_id,
        }
    }

    /// Server-initiated disconnect notice.
    #[must_use]
    pub fn disconnect(reason: Reason, sequence_id: u32) -> Self {
        Self {
            control: ControlType::Disconnect,
            reason,
            advice: Advice::None,
            flags: DirectiveFlags::default(),
            sequence_id,
        }
    }

    /// Return a copy with the transient qualifier set.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.flags = self.flags.transient();
        self
    }

    /// Return a copy with the auth-related qualifier set.
    #[must_use]
    pub fn auth_related(mut self) -> Self {
        self.flags = self.flags.auth_related();
        self
    }
}
