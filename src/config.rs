//! Client configuration.
//!
//! # Example
//!
//! ```
//! use undercover_client::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("ws://game.example/api/v1/ws")
//!     .with_join_timeout(Duration::from_secs(3))
//!     .with_max_reconnect_attempts(3);
//! assert_eq!(config.reconnect.max_attempts, 3);
//! assert_eq!(config.reconnect.delay_for(2), Duration::from_secs(4));
//! ```

use std::time::Duration;

use tracing::warn;

/// Default room stream endpoint for a locally running server.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8888/api/v1/ws";

/// Default deadline for the join handshake.
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of automatic reconnect attempts after a mid-session drop.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay; attempt `n` waits `n × base`.
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default timeout for the graceful shutdown of a connection task.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded, linearly growing reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts after a drop before giving up. Zero disables reconnecting.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
        }
    }
}

/// Configuration for a [`GameClient`](crate::client::GameClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Room stream endpoint used by [`WebSocketConnector`](crate::transports::WebSocketConnector).
    pub server_url: String,
    /// Deadline covering connect + join. Defaults to **5 seconds**.
    pub join_timeout: Duration,
    /// Reconnect schedule after a mid-session drop.
    pub reconnect: ReconnectPolicy,
    /// How long a superseded connection task may take to close before it is
    /// aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given endpoint with default timings.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `UNDERCOVER_WS_URL`, `UNDERCOVER_JOIN_TIMEOUT_MS`,
    /// `UNDERCOVER_MAX_RECONNECT_ATTEMPTS`, `UNDERCOVER_RECONNECT_DELAY_MS`.
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("UNDERCOVER_WS_URL") {
            config.server_url = url;
        }
        if let Some(ms) = env_number::<u64>("UNDERCOVER_JOIN_TIMEOUT_MS") {
            config.join_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_number::<u32>("UNDERCOVER_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(ms) = env_number::<u64>("UNDERCOVER_RECONNECT_DELAY_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        config
    }

    /// Set the join handshake deadline.
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set the number of automatic reconnect attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Set the base reconnect delay.
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect.base_delay = delay;
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.join_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builder_methods() {
        let config = ClientConfig::new("ws://x")
            .with_join_timeout(Duration::from_millis(250))
            .with_max_reconnect_attempts(0)
            .with_reconnect_base_delay(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::ZERO);
        assert_eq!(config.server_url, "ws://x");
        assert_eq!(config.join_timeout, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(10));
        assert_eq!(config.shutdown_timeout, Duration::ZERO);
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, [2, 4, 6, 8, 10]);
    }
}
