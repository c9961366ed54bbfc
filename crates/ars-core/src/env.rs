//! Environment abstraction for deterministic testing.
//!
//! Decouples drivers from system clocks. Production uses the real monotonic
//! and wall clocks; simulation uses a paused tokio clock and a fixed epoch.

use std::{ops::Sub, time::Duration};

use time::OffsetDateTime;

/// Clocks available to a driver.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `wall_clock()` is only used to stamp outbound messages, never for
///   timeouts
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`, simulation uses
    /// `tokio::time::Instant` with paused time.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time, used as a message send timestamp.
    fn wall_clock(&self) -> OffsetDateTime;
}
