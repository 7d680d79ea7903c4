#![no_main]

use hashmesh_protocol::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic
    if let Ok(message) = Message::from_bytes(data) {
        // Anything that decodes has a body matching its type
        assert!(message.check_body().is_ok());

        if let Ok(encoded) = message.to_bytes() {
            let _ = Message::from_bytes(&encoded);
        }
    }
});
