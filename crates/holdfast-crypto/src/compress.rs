//! DEFLATE payload compression for the COMPRESSED frame flag.

use std::io::{Read, Write};

use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};

use crate::error::CryptoError;

/// Compress a payload with DEFLATE.
#[must_use]
pub fn deflate(payload: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());

    // Writing to a Vec cannot fail
    let Ok(()) = encoder.write_all(payload) else {
        unreachable!("writing to an in-memory encoder cannot fail");
    };
    let Ok(compressed) = encoder.finish() else {
        unreachable!("finishing an in-memory encoder cannot fail");
    };

    compressed
}

/// Decompress a payload, bounded by `max_len`.
///
/// The bound is the caller's frame-size ceiling; a payload that inflates
/// past it is rejected rather than allocated.
///
/// # Errors
///
/// - [`CryptoError::DecompressFailed`] on corrupt input or when the inflated
///   size exceeds `max_len`
pub fn inflate(payload: &[u8], max_len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut decoder = DeflateDecoder::new(payload).take(max_len as u64 + 1);
    let mut inflated = Vec::new();

    decoder
        .read_to_end(&mut inflated)
        .map_err(|_| CryptoError::DecompressFailed { reason: "corrupt stream" })?;

    if inflated.len() > max_len {
        return Err(CryptoError::DecompressFailed { reason: "inflates past frame ceiling" });
    }

    Ok(inflated)
}
