//! Holdfast Cryptographic Primitives
//!
//! Cryptographic building blocks for the Holdfast session protocol. Pure
//! functions with deterministic outputs. Callers provide random bytes for
//! deterministic testing.
//!
//! # Key Lifecycle
//!
//! Each connection negotiates its own symmetric key through an ephemeral
//! Diffie-Hellman exchange. The private scalar exists only for the duration
//! of one handshake and is wiped on the exit path.
//!
//! ```text
//! Client public key ──┐
//!                     ▼
//! X25519 ephemeral agreement → shared point (wiped)
//!                     │
//!                     ▼
//! Keccak-256 → 32-byte session key (per connection)
//!                     │
//!                     ▼
//! XChaCha20-Poly1305 → sealed string fields (Base64 framing)
//! ```
//!
//! Password storage is independent of the session layer: PBKDF2-HMAC-SHA512
//! with a 64-byte random salt, verified in constant time, with an
//! equal-cost sink for unknown-user lookups.
//!
//! # Security
//!
//! Transport/credential separation:
//! - The session key protects fields in flight and never touches storage
//! - Password hashes live in storage and never travel on the wire
//!
//! Timing discipline:
//! - Hash comparison is branchless
//! - Unknown users burn the same KDF cost as known users
//!
//! Hygiene:
//! - Private scalars, shared points, derived keys, and hash buffers are
//!   zeroized when their holders drop

#![forbid(unsafe_code)]

mod compress;
mod error;
mod exchange;
mod password;
mod seal;

pub use compress::{deflate, inflate};
pub use error::CryptoError;
pub use exchange::{KEY_LEN, Keypair, SESSION_KEY_LEN, SessionKey};
pub use password::{
    HASH_LEN, PBKDF2_ROUNDS, PasswordHash, SALT_LEN, hash_password, verify_password, verify_sink,
};
pub use seal::{NONCE_LEN, open_field, seal_field};
