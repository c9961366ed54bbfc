//! Fuzz target for the Timeline merge
//!
//! # Strategy
//!
//! - Pages and live messages are drawn from a small seed space so the same
//!   message arrives through several paths
//! - Prepended pages may be out of order or overlap what is displayed
//!
//! # Invariants
//!
//! - Timeline stays sorted by timestamp with no duplicate keys
//! - Contents equal the last initial page, plus older pages merged since,
//!   plus every live message
//! - A prepend returns `None` exactly when it added nothing

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use ars_core::{ScrollDirective, Timeline};
use ars_harness::{SmallMessage, SmallPage};
use ars_proto::{Message, MessageKey};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum MergeOp {
    Replace(SmallPage),
    Prepend(Vec<SmallMessage>),
    Live(SmallMessage),
}

fuzz_target!(|ops: Vec<MergeOp>| {
    let mut timeline = Timeline::new();
    let mut expected: HashSet<MessageKey> = HashSet::new();
    let mut live: HashSet<MessageKey> = HashSet::new();

    for op in ops {
        match op {
            MergeOp::Replace(page) => {
                let messages = page.to_messages();
                expected = messages.iter().map(Message::key).chain(live.iter().cloned()).collect();
                assert_eq!(timeline.replace(messages), ScrollDirective::ToBottom);
            },
            MergeOp::Prepend(raw) => {
                let messages: Vec<Message> = raw.into_iter().map(SmallMessage::to_message).collect();
                let before = expected.len();
                expected.extend(messages.iter().map(Message::key));
                let added = expected.len() - before;

                match timeline.prepend(messages) {
                    Some(ScrollDirective::PreserveAnchor { prepended }) => {
                        assert_eq!(prepended, added);
                    },
                    Some(ScrollDirective::ToBottom) => unreachable!("prepend never scrolls to bottom"),
                    None => assert_eq!(added, 0),
                }
            },
            MergeOp::Live(message) => {
                let message = message.to_message();
                let fresh = expected.insert(message.key());
                if fresh {
                    live.insert(message.key());
                }
                assert_eq!(timeline.append_live(message).is_some(), fresh);
            },
        }

        assert!(timeline.is_consistent());
        let keys: HashSet<MessageKey> = timeline.iter().map(Message::key).collect();
        assert_eq!(keys, expected);
        assert_eq!(timeline.len(), expected.len());
    }
});
