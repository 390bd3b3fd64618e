//! Ephemeral X25519 key agreement and session-key derivation.
//!
//! All functions are pure - random bytes must be provided by the caller.
//! This enables deterministic testing and keeps entropy sourcing in one
//! place (the server's environment).
//!
//! The session key is `Keccak-256(X25519(private, peer_public))`: the raw
//! shared point never leaves this module, and the private scalar and shared
//! secret are wiped when the agreement value is dropped.

use sha3::{Digest, Keccak256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// X25519 public/private key length in bytes.
pub const KEY_LEN: usize = 32;

/// Symmetric session key length in bytes (Keccak-256 output).
pub const SESSION_KEY_LEN: usize = 32;

/// Server-side ephemeral keypair for one handshake.
///
/// The private scalar lives exactly as long as this value; `x25519-dalek`
/// zeroizes it on drop. Use [`Keypair::agree`] to consume the pair and
/// derive the session key.
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

/// 32-byte symmetric session key, wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl Keypair {
    /// Build a keypair from caller-provided random bytes.
    ///
    /// The seed is clamped by `x25519-dalek`; any 32 bytes of
    /// cryptographically secure randomness are acceptable.
    #[must_use]
    pub fn from_seed(mut seed: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(seed);
        seed.zeroize();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw public key bytes to send to the peer.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }

    /// Consume the keypair, agree with the peer's public key, and derive
    /// the symmetric session key.
    ///
    /// The private scalar and the raw shared point are both wiped before
    /// this returns; only the derived key survives.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::BadPublicKey`] if `peer_public` is not 32 bytes
    pub fn agree(self, peer_public: &[u8]) -> Result<SessionKey, CryptoError> {
        let peer: [u8; KEY_LEN] = peer_public.try_into().map_err(|_| {
            CryptoError::BadPublicKey { expected: KEY_LEN, actual: peer_public.len() }
        })?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));

        let mut digest = Keccak256::new();
        digest.update(shared.as_bytes());
        let output = digest.finalize();

        // SharedSecret zeroizes its point on drop; the derived key is the
        // only material that leaves this scope.
        let mut key = [0u8; SESSION_KEY_LEN];
        key.copy_from_slice(&output);
        Ok(SessionKey(key))
    }
}

impl SessionKey {
    /// Wrap existing key material (e.g. restored test fixtures).
    #[must_use]
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Key bytes for the AEAD.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("SessionKey(..)")
    }
}
