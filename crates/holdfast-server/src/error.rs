//! Server error types.

use std::fmt;

use holdfast_core::RepositoryError;
use holdfast_crypto::CryptoError;
use holdfast_proto::ProtocolError;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad limiter knobs, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, socket I/O, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    /// Check error message for details.
    Transport(String),

    /// Wire protocol error (invalid frame, malformed body).
    ///
    /// Indicates a client sent data the codec rejects. Fatal for that
    /// connection, but the server keeps serving other clients.
    Protocol(ProtocolError),

    /// Cryptographic operation failed (key agreement, unsealing).
    ///
    /// Fatal for the operation that hit it; the client receives a directive
    /// and may retry after repairing its session.
    Crypto(CryptoError),

    /// Credentials backend error.
    ///
    /// Usually transient (backend unavailable); the client is told to back
    /// off and retry.
    Repository(RepositoryError),

    /// Internal error (unexpected state, logic bug).
    ///
    /// Should never happen in a correct implementation. Indicates a bug -
    /// report as issue.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(err) => write!(f, "protocol error: {err}"),
            Self::Crypto(err) => write!(f, "crypto error: {err}"),
            Self::Repository(err) => write!(f, "repository error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Crypto(err) => Some(err),
            Self::Repository(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        Self::Crypto(err)
    }
}

impl From<RepositoryError> for ServerError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
