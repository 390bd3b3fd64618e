//! Fuzz target for sealed-field opening
//!
//! Attacker-controlled Base64 text reaches open_field on every encrypted
//! frame, so it must never panic: bad Base64, short framing, corrupt
//! tags, and non-UTF-8 plaintexts all collapse into OpenFailed.

#![no_main]

use arbitrary::Arbitrary;
use holdfast_crypto::{SessionKey, open_field, seal_field};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct SealedInput {
    key: [u8; 32],
    hostile: String,
    plaintext: String,
    nonce: [u8; 24],
    flip: Option<(usize, u8)>,
}

fuzz_target!(|input: SealedInput| {
    let key = SessionKey::from_bytes(input.key);

    // Hostile text must never panic
    let _ = open_field(&key, &input.hostile);

    // A genuine seal round-trips; a tampered one fails closed
    let sealed = seal_field(&key, &input.plaintext, input.nonce);
    match input.flip {
        None => {
            let opened = open_field(&key, &sealed).expect("untampered seal must open");
            assert_eq!(opened, input.plaintext);
        },
        Some((index, bit)) => {
            let mut bytes = sealed.into_bytes();
            if !bytes.is_empty() {
                let index = index % bytes.len();
                bytes[index] ^= 1 << (bit % 8);
            }
            let tampered = String::from_utf8_lossy(&bytes).into_owned();
            // Either rejected outright or (bit flip in ignored Base64
            // padding) opens to the original plaintext - never junk
            if let Ok(opened) = open_field(&key, &tampered) {
                assert_eq!(opened, input.plaintext);
            }
        },
    }
});
