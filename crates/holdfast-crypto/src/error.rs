//! Crypto error types.

use thiserror::Error;

/// Errors from the cryptographic primitives.
///
/// Deliberately coarse: callers need "this field did not unseal" and "this
/// payload did not inflate", never the cipher-internal cause (which would be
/// an oracle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A peer-supplied public key had the wrong length.
    #[error("peer public key must be {expected} bytes, got {actual}")]
    BadPublicKey {
        /// Required key length.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// A sealed field failed to open (bad framing, tamper, or wrong key).
    #[error("sealed field did not open")]
    OpenFailed,

    /// A compressed payload failed to inflate or exceeded the size ceiling.
    #[error("payload did not decompress: {reason}")]
    DecompressFailed {
        /// What went wrong.
        reason: &'static str,
    },
}
