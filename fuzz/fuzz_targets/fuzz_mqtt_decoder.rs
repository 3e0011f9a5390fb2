//! Fuzz target: MQTT framing and packet decoding
//!
//! Walks arbitrary bytes frame by frame the way the connection does on
//! receive and asserts the framer never reports a frame shorter than its
//! own fixed header and the decoder never panics.
//!
//! cargo fuzz run fuzz_mqtt_decoder

#![no_main]

use envnode::adapters::mqtt::packet::{self, Packet};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut rest = data;
    while let Ok(Some(len)) = packet::frame_len(rest) {
        assert!(len >= 2, "frame shorter than a fixed header");
        if len > rest.len() {
            break;
        }
        if let Ok(Packet::Publish { topic, payload, .. }) = packet::decode_frame(&rest[..len]) {
            assert!(topic.len() + payload.len() < len);
        }
        rest = &rest[len..];
    }
});
