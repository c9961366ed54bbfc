//! Fuzz target for HistoryPage::decode
//!
//! Response bodies are arbitrary bytes from the backend; decoding must only
//! ever return an error for bad input.

#![no_main]

use ars_proto::HistoryPage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = HistoryPage::decode(data);
});
