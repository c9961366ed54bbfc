//! Fuzz target for the channel session state machine
//!
//! Drives a real session with arbitrary operation sequences through the
//! model-based driver. Covers the same ground as the proptest model tests,
//! but lets coverage guidance find the interleavings.
//!
//! # Invariants
//!
//! - Every standard invariant holds after every step
//! - The timeline holds exactly the messages the model expects

#![no_main]

use ars_core::SessionConfig;
use ars_harness::{ChannelDriver, InvariantRegistry, Operation};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<Operation>| {
    let registry = InvariantRegistry::standard();
    let Ok(mut driver) = ChannelDriver::mount("alice", SessionConfig::default()) else {
        return;
    };

    for (step, op) in ops.iter().enumerate() {
        driver.apply(op);
        registry.assert_all(&driver.snapshot(), &format!("after step {step} ({op:?})"));
        assert!(driver.matches_model(), "timeline diverged from model after step {step}");
    }
});
