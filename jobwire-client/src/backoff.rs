//! Backoff strategies shared by request retries and stream reconnection
//!
//! A strategy answers one question: given the 0-indexed attempt number, how
//! long to wait before trying again, or whether to stop. Strategies are
//! stateless; the attempt counter lives with whoever is retrying.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: `initial × 2^attempt`, bounded attempt count
//! - **NoBackoff**: never try again
//!
//! # Examples
//!
//! ```rust
//! use jobwire_client::{BackoffStrategy, ExponentialBackoff};
//! use std::time::Duration;
//!
//! let reconnect = ExponentialBackoff::new(Duration::from_secs(1)).with_max_attempts(5);
//! assert_eq!(reconnect.next_delay(0), Some(Duration::from_secs(1)));
//! assert_eq!(reconnect.next_delay(4), Some(Duration::from_secs(16)));
//! assert_eq!(reconnect.next_delay(5), None);
//! ```

use std::time::Duration;

/// Decides the delay before the next attempt
pub trait BackoffStrategy: Send + Sync {
    /// Delay before attempt `attempt` (0-indexed), or `None` to give up
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff without jitter unless asked for
///
/// The fixed doubling sequence keeps retry and reconnect timing
/// reproducible. [`ExponentialBackoff::with_jitter`] is a separate opt-in
/// variant that adds up to 25% random delay on top of each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Option<Duration>,
    max_attempts: Option<u32>,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a strategy starting at `initial_delay`, with unlimited attempts
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: None,
            max_attempts: None,
            jitter: false,
        }
    }

    /// Request retries: 3 attempts starting at 1 s
    pub fn request_default() -> Self {
        Self::new(Duration::from_millis(1000)).with_max_attempts(3)
    }

    /// Stream reconnection: 5 attempts starting at 1 s
    pub fn reconnect_default() -> Self {
        Self::new(Duration::from_millis(1000)).with_max_attempts(5)
    }

    /// Stop after this many attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Cap each individual delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Add 0-25% random delay to every step
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let base = self.initial_delay.as_millis() as u64;
        let mut delay = base.saturating_mul(2u64.saturating_pow(attempt));
        if let Some(cap) = self.max_delay {
            delay = delay.min(cap.as_millis() as u64);
        }

        if self.jitter {
            use rand::Rng;
            delay += rand::thread_rng().gen_range(0..=(delay / 4));
        }

        Some(Duration::from_millis(delay))
    }
}

/// Strategy that never tries again
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}
