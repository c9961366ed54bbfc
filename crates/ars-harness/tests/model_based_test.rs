//! Model-based property tests.
//!
//! Random operation sequences are applied to a real channel session. After
//! every step the timeline must hold exactly the messages the reference model
//! expects, and every standard invariant must hold.
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!                  ┌───────┴───────┐
//!                  ▼               ▼
//!           ChannelSession    expected keys
//!                  └───────┬───────┘
//!                          ▼
//!               compare + invariants
//! ```

use ars_core::{ConnectionState, ReconnectPolicy, SessionConfig};
use ars_harness::{ChannelDriver, InvariantRegistry, Operation, SmallMessage, SmallPage};
use proptest::prelude::*;

fn small_message_strategy() -> impl Strategy<Value = SmallMessage> {
    (0u8..32, 0u8..3).prop_map(|(seed, author)| SmallMessage { seed, author })
}

fn small_page_strategy() -> impl Strategy<Value = SmallPage> {
    (prop::collection::vec(small_message_strategy(), 0..6), any::<bool>())
        .prop_map(|(messages, has_next)| SmallPage { messages, has_next })
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => Just(Operation::HandshakeOk),
        1 => Just(Operation::TransportDrop),
        6 => small_message_strategy().prop_map(|message| Operation::Live { message }),
        1 => small_message_strategy().prop_map(|message| Operation::StaleFrame { message }),
        1 => prop::collection::vec(any::<u8>(), 0..16).prop_map(|bytes| Operation::Garbage { bytes }),
        2 => Just(Operation::LoadOlder),
        1 => Just(Operation::Reload),
        4 => small_page_strategy().prop_map(|page| Operation::DeliverHistory { page }),
        1 => small_page_strategy().prop_map(|page| Operation::DeliverStale { page }),
        1 => Just(Operation::FailHistory),
        1 => any::<u8>().prop_map(|seed| Operation::Send { seed }),
        2 => (0u16..20_000).prop_map(|millis| Operation::AdvanceTime { millis }),
    ]
}

fn run(ops: &[Operation], config: SessionConfig) -> Result<(), TestCaseError> {
    let registry = InvariantRegistry::standard();
    let mut driver = ChannelDriver::mount("alice", config).map_err(|e| TestCaseError::fail(e.to_string()))?;

    for (step, op) in ops.iter().enumerate() {
        driver.apply(op);

        let context = format!("after step {step} ({op:?})");
        registry.assert_all(&driver.snapshot(), &context);
        prop_assert!(driver.matches_model(), "timeline diverged from model {}", context);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Timeline matches the model under arbitrary interleavings.
    #[test]
    fn timeline_matches_model(ops in prop::collection::vec(operation_strategy(), 0..60)) {
        run(&ops, SessionConfig::default())?;
    }

    /// Same, with reconnect disabled so drops are terminal.
    #[test]
    fn timeline_matches_model_without_reconnect(ops in prop::collection::vec(operation_strategy(), 0..60)) {
        let mut config = SessionConfig::default();
        config.connection.reconnect = ReconnectPolicy::disabled();
        run(&ops, config)?;
    }

    /// Nothing changes after teardown.
    #[test]
    fn teardown_freezes_the_session(
        before in prop::collection::vec(operation_strategy(), 0..30),
        after in prop::collection::vec(operation_strategy(), 0..30),
    ) {
        let mut driver = ChannelDriver::mount("alice", SessionConfig::default())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        for op in &before {
            driver.apply(op);
        }

        driver.apply(&Operation::Teardown);
        let frozen = driver.session().timeline().to_vec();
        let sent = driver.sent().len();

        for op in &after {
            driver.apply(op);
        }

        prop_assert_eq!(driver.session().timeline().to_vec(), frozen);
        prop_assert_eq!(driver.sent().len(), sent);
        prop_assert_eq!(driver.session().connection_state(), ConnectionState::Closed);
        prop_assert!(!driver.session().is_loading());
    }

    /// Frames are only ever sent while open, and never echoed locally.
    #[test]
    fn sends_require_open_connection(ops in prop::collection::vec(operation_strategy(), 0..40)) {
        let mut driver = ChannelDriver::mount("alice", SessionConfig::default())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        for op in &ops {
            let open = driver.session().connection_state() == ConnectionState::Open
                && !driver.session().is_closed();
            let sent = driver.sent().len();
            let timeline = driver.session().timeline().len();

            driver.apply(op);

            if let Operation::Send { .. } = op {
                prop_assert_eq!(driver.sent().len(), sent + usize::from(open));
                prop_assert_eq!(driver.session().timeline().len(), timeline);
            }
        }
    }
}
