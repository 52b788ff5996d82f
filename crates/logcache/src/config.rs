//! Engine configuration.

use std::time::Duration;

use crate::types::MAX_LINE_LIMIT;

/// Configuration for the tail streamer.
#[derive(Debug, Clone)]
pub struct TailConfig {
    /// Delay between polls that returned a short batch, and between retries.
    pub poll_interval: Duration,
    /// Consecutive failed fetches tolerated in follow mode before giving up.
    pub max_retries: u32,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_retries: 5,
        }
    }
}

impl TailConfig {
    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Configuration for the range-query bridge.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Envelopes requested per window.
    pub window_limit: usize,
    /// Sources streamed at the same time.
    pub max_concurrency: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            window_limit: MAX_LINE_LIMIT,
            max_concurrency: 8,
        }
    }
}
