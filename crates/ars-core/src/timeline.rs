//! Ordered, de-duplicated message list.
//!
//! The timeline merges two sources into the single list the view displays:
//! history pages arriving newest-page-first and live messages arriving in
//! real time.
//!
//! # Invariants
//!
//! - Messages are sorted non-decreasing by timestamp.
//! - No two messages share a [`MessageKey`].
//! - Messages with equal timestamps keep their arrival order.
//! - Live messages survive an initial page that does not carry them.
//!
//! Well-behaved input (live messages in order, older pages strictly older)
//! is only ever appended or prepended. Skewed input is inserted at its
//! sorted position instead of breaking the order.

use std::collections::{HashSet, VecDeque};

use ars_proto::{Message, MessageKey};
use tracing::debug;

/// What the view should do with its scroll position after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirective {
    /// Scroll to the newest message after layout
    ToBottom,
    /// Keep the viewport on the same messages after `prepended` were added
    /// above them
    PreserveAnchor {
        /// Number of messages inserted before the previous first message
        prepended: usize,
    },
}

/// The merged message list.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: VecDeque<Message>,
    keys: HashSet<MessageKey>,
    // Subset of `keys` that first arrived on the live stream
    live: HashSet<MessageKey>,
}

impl Timeline {
    /// Empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of displayed messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is displayed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Oldest displayed message.
    pub fn first(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// Newest displayed message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Whether a message with the same key is displayed.
    pub fn contains(&self, message: &Message) -> bool {
        self.keys.contains(&message.key())
    }

    /// Owned copy of the list, oldest first.
    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Replace history with an initial page.
    ///
    /// Messages from earlier pages are dropped. Displayed live messages are
    /// merged into the page, so one that landed after the server took its
    /// snapshot is not lost.
    pub fn replace(&mut self, page: Vec<Message>) -> ScrollDirective {
        let live: Vec<Message> =
            self.messages.drain(..).filter(|m| self.live.contains(&m.key())).collect();
        self.keys.clear();

        let mut kept = 0usize;
        for message in page {
            if self.keys.insert(message.key()) {
                self.messages.push_back(message);
            }
        }
        for message in live {
            if self.keys.insert(message.key()) {
                kept += 1;
                self.messages.push_back(message);
            }
        }
        if kept > 0 {
            debug!(messages = kept, "keeping live messages missing from initial page");
        }

        // Stable, so equal timestamps keep page order ahead of live
        self.messages.make_contiguous().sort_by_key(|m| m.timestamp);

        ScrollDirective::ToBottom
    }

    /// Prepend an older page.
    ///
    /// Returns `None` if every message was already displayed.
    pub fn prepend(&mut self, page: Vec<Message>) -> Option<ScrollDirective> {
        let fresh: Vec<Message> =
            page.into_iter().filter(|m| self.keys.insert(m.key())).collect();

        if fresh.is_empty() {
            return None;
        }

        let prepended = fresh.len();
        let in_order = fresh.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);
        let older = match (fresh.last(), self.messages.front()) {
            (Some(newest), Some(front)) => newest.timestamp <= front.timestamp,
            _ => true,
        };

        if in_order && older {
            for message in fresh.into_iter().rev() {
                self.messages.push_front(message);
            }
        } else {
            debug!(messages = prepended, "older page overlaps timeline, merging");
            for message in fresh.into_iter().rev() {
                let at = self.messages.partition_point(|m| m.timestamp < message.timestamp);
                self.messages.insert(at, message);
            }
        }

        Some(ScrollDirective::PreserveAnchor { prepended })
    }

    /// Append a live message.
    ///
    /// Returns `None` if the message is already displayed.
    pub fn append_live(&mut self, message: Message) -> Option<ScrollDirective> {
        if !self.keys.insert(message.key()) {
            debug!(username = %message.username, "dropping duplicate live message");
            return None;
        }
        self.live.insert(message.key());

        let at = self.messages.partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(at, message);

        Some(ScrollDirective::ToBottom)
    }

    /// Check the ordering and uniqueness invariants.
    pub fn is_consistent(&self) -> bool {
        let sorted = self
            .messages
            .iter()
            .zip(self.messages.iter().skip(1))
            .all(|(a, b)| a.timestamp <= b.timestamp);

        let unique = self.keys.len() == self.messages.len()
            && self.messages.iter().all(|m| self.keys.contains(&m.key()));

        sorted && unique && self.live.is_subset(&self.keys)
    }
}
