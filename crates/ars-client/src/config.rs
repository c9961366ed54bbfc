//! Runtime and HTTP configuration.

use std::time::Duration;

use ars_core::SessionConfig;

/// Interval between session ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How often timeouts and reconnects are evaluated
    pub tick_interval: Duration,
    /// Settings for every mounted session
    pub session: SessionConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_interval: DEFAULT_TICK_INTERVAL, session: SessionConfig::default() }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Timeout for one request, including the body
    pub request_timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("ars-chat/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
