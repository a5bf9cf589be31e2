#![no_main]

use libfuzzer_sys::fuzz_target;
use undercover_client::{codec, GameState};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding must never panic, and neither may folding whatever it yields.
    if let Some(event) = codec::decode(text) {
        let mut state = GameState::new();
        state.apply(event);
    }
    let _ = codec::decode_request(text);
});
