#![no_main]

use libfuzzer_sys::fuzz_target;
use worker_link::{Codec, JsonCodec};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    // Anything the codec accepts must have a usable type and re-encode cleanly.
    // Bodies are not compared: float bodies may not round-trip bit-exactly.
    if let Some(envelope) = JsonCodec.decode(raw) {
        assert!(!envelope.kind.is_empty());
        let encoded = JsonCodec.encode(&envelope).expect("decoded envelope re-encodes");
        let again = JsonCodec.decode(&encoded).expect("re-encoded envelope decodes");
        assert_eq!(again.kind, envelope.kind);
        assert_eq!(again.body.is_some(), envelope.body.is_some());
    }
});
