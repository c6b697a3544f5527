#![no_main]

use libfuzzer_sys::fuzz_target;
use meshrelay_sim::air::{decode_frame, encode_frame};

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = decode_frame(data) {
        let bytes = encode_frame(&packet).expect("decoded frame re-encodes");
        assert_eq!(decode_frame(&bytes).ok(), Some(packet));
    }
});
