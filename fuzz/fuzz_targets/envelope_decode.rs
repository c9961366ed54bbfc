//! Fuzz target for Envelope::decode
//!
//! Live frames come straight off the socket. Any text must decode to an
//! envelope or an error, never panic, and a decoded chat message must survive
//! a re-encode unchanged.

#![no_main]

use ars_proto::Envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    let Ok(envelope) = Envelope::decode(text) else {
        return;
    };

    if let Envelope::ChatMessage(_) = &envelope {
        let encoded = envelope.encode().unwrap();
        assert_eq!(Envelope::decode(&encoded).unwrap(), envelope);
    }
});
