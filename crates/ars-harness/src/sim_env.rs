//! Environment on tokio's clock.
//!
//! Under `#[tokio::test(start_paused = true)]` the clock only moves when every
//! task is idle, so timeouts and reconnect delays fire deterministically and
//! instantly.

use std::time::Duration;

use ars_core::Environment;
use time::{OffsetDateTime, macros::datetime};
use tokio::time::Instant;

/// Wall-clock reading at the start of every simulation.
pub const SIM_EPOCH: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

/// Simulated environment.
///
/// The wall clock starts at [`SIM_EPOCH`] and advances with tokio time.
#[derive(Debug, Clone, Copy)]
pub struct SimEnv {
    started: Instant,
    wall_start: OffsetDateTime,
}

impl SimEnv {
    /// Start a simulated clock at [`SIM_EPOCH`].
    pub fn new() -> Self {
        Self::starting_at(SIM_EPOCH)
    }

    /// Start a simulated clock whose wall time reads `wall_start` now.
    pub fn starting_at(wall_start: OffsetDateTime) -> Self {
        Self { started: Instant::now(), wall_start }
    }

    /// Simulated time since creation.
    pub fn elapsed(&self) -> Duration {
        Instant::now() - self.started
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> OffsetDateTime {
        self.wall_start + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn wall_clock_follows_paused_time() {
        let env = SimEnv::new();
        assert_eq!(env.wall_clock(), SIM_EPOCH);

        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!(env.elapsed(), Duration::from_secs(90));
        assert_eq!(env.wall_clock(), datetime!(2024-05-01 12:01:30 UTC));
    }
}
