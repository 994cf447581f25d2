//! Per-client rate limiting
//!
//! A fixed one-minute window per client key: the first request in a window
//! starts the clock, each request increments a counter, and the counter
//! resets when the window rolls over. Excess requests are rejected with the
//! time until the window resets, which the handler surfaces as a
//! `retry-after` header.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Rate limiter settings
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Requests allowed per window per client
    pub max_per_window: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: 20,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Effectively no limiting, for tests that exercise other paths
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_per_window: u32::MAX,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of a rate check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// Request may proceed
    Allowed,
    /// Quota exhausted for this window
    Rejected {
        /// Time until the client's window resets
        retry_after: Duration,
    },
}

#[derive(Clone, Copy, Debug)]
struct WindowState {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by client identity
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: RwLock<HashMap<String, WindowState>>,
}

impl FixedWindowLimiter {
    /// Create a limiter with the given settings
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request for `key` and decide whether it may proceed
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut windows = self.windows.write();
        let state = windows.entry(key.to_string()).or_insert(WindowState {
            started: now,
            count: 0,
        });

        if now.duration_since(state.started) >= self.config.window {
            state.started = now;
            state.count = 0;
        }

        if state.count >= self.config.max_per_window {
            let elapsed = now.duration_since(state.started);
            let retry_after = self.config.window.saturating_sub(elapsed);
            tracing::debug!(key, count = state.count, "rate limit exceeded");
            return RateDecision::Rejected { retry_after };
        }

        state.count += 1;
        RateDecision::Allowed
    }

    /// Drop entries whose window has fully elapsed
    ///
    /// Called opportunistically so the map doesn't grow with every client
    /// ever seen.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .write()
            .retain(|_, state| now.duration_since(state.started) < window);
    }

    /// Number of tracked clients, for tests and diagnostics
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.read().len()
    }
}
