//! Sealed string fields using `XChaCha20-Poly1305`.
//!
//! When a frame carries the ENCRYPTED flag, its string payload fields hold
//! `Base64(nonce[24] || ciphertext+tag)` instead of plaintext. The 24-byte
//! XChaCha20 nonce is caller-provided randomness, making the functions pure
//! and the nonce space wide enough that random nonces cannot collide in a
//! session's lifetime.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CryptoError, exchange::SessionKey};

/// XChaCha20 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Seal one string field under the session key.
///
/// Returns the Base64 text that replaces the plaintext on the wire.
///
/// # Security
///
/// - Caller MUST provide cryptographically secure random nonce bytes
/// - Authenticated encryption: any tamper fails [`open_field`]
#[must_use]
pub fn seal_field(key: &SessionKey, plaintext: &str, nonce: [u8; NONCE_LEN]) -> String {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes()) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    framed.extend_from_slice(&nonce);
    framed.extend_from_slice(&ciphertext);

    BASE64.encode(framed)
}

/// Open one sealed string field.
///
/// # Errors
///
/// - [`CryptoError::OpenFailed`] on bad Base64, short framing, failed
///   authentication tag, or non-UTF-8 plaintext. The variants are collapsed
///   so the error carries no oracle about which check failed.
pub fn open_field(key: &SessionKey, sealed: &str) -> Result<String, CryptoError> {
    let framed = BASE64.decode(sealed).map_err(|_| CryptoError::OpenFailed)?;

    let (nonce, ciphertext) = framed.split_at_checked(NONCE_LEN).ok_or(CryptoError::OpenFailed)?;
    if ciphertext.len() < POLY1305_TAG_SIZE {
        return Err(CryptoError::OpenFailed);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::OpenFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::OpenFailed)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::from_bytes([0x42; 32])
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key();
        let sealed = seal_field(&key, "Str0ng!Pass", [0xAB; NONCE_LEN]);

        assert_ne!(sealed, "Str0ng!Pass");
        assert_eq!(open_field(&key, &sealed).expect("open"), "Str0ng!Pass");
    }

    #[test]
    fn empty_field_roundtrip() {
        let key = test_key();
        let sealed = seal_field(&key, "", [0x00; NONCE_LEN]);
        assert_eq!(open_field(&key, &sealed).expect("open"), "");
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal_field(&test_key(), "secret", [0x01; NONCE_LEN]);
        let other = SessionKey::from_bytes([0x43; 32]);

        assert_eq!(open_field(&other, &sealed), Err(CryptoError::OpenFailed));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key();
        let sealed = seal_field(&key, "secret", [0x01; NONCE_LEN]);

        let mut framed = BASE64.decode(&sealed).expect("valid base64");
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        let tampered = BASE64.encode(framed);

        assert_eq!(open_field(&key, &tampered), Err(CryptoError::OpenFailed));
    }

    #[test]
    fn garbage_input_fails() {
        let key = test_key();
        assert_eq!(open_field(&key, "not base64 !!!"), Err(CryptoError::OpenFailed));
        assert_eq!(open_field(&key, "AAAA"), Err(CryptoError::OpenFailed));
        assert_eq!(open_field(&key, ""), Err(CryptoError::OpenFailed));
    }

    #[test]
    fn different_nonces_differ() {
        let key = test_key();
        let a = seal_field(&key, "same", [0x01; NONCE_LEN]);
        let b = seal_field(&key, "same", [0x02; NONCE_LEN]);
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_seal_open_identity(
            plaintext in "[ -~]{0,128}",
            nonce in any::<[u8; NONCE_LEN]>(),
            key_bytes in any::<[u8; 32]>(),
        ) {
            let key = SessionKey::from_bytes(key_bytes);
            let sealed = seal_field(&key, &plaintext, nonce);
            prop_assert_eq!(open_field(&key, &sealed).expect("open"), plaintext);
        }
    }
}
