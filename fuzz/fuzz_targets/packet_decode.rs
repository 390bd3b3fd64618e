//! Fuzz target for end-to-end packet parsing
//!
//! Drives arbitrary bytes through the full inbound codec path
//! (Frame::decode then Packet::from_frame) and, when the input survives,
//! re-encodes and checks the round trip. Finds:
//! - Body parsers that panic on truncated or hostile payloads
//! - Length-prefix handling bugs in the string codec
//! - Encode/decode asymmetries

#![no_main]

use holdfast_proto::{Frame, Packet};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let Ok(packet) = Packet::from_frame(&frame) else {
        return;
    };

    // Whatever decoded must re-encode and decode to the same value
    let mut wire = vec![0u8; packet.wire_len()];
    let written = packet.encode_into(&mut wire).expect("decoded packet must re-encode");
    assert_eq!(written, wire.len());

    let reframed = Frame::decode(&wire).expect("re-encoded frame must decode");
    let reparsed = Packet::from_frame(&reframed).expect("re-encoded body must parse");
    assert_eq!(reparsed, packet);
});
