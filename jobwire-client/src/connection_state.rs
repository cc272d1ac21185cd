//! Per-scope connection state
//!
//! Every stream scope owns one [`ScopeState`]: its lifecycle state and its
//! reconnect counter. Scopes never share counters.
//!
//! # State Transitions
//!
//! ```text
//! Idle → Connecting → Open → Closed
//!            ↑                  │
//!            └── reconnect ─────┘   (transient close, counter below cap)
//! ```
//!
//! # Reconnect Counter
//!
//! The counter only grows when a transient close schedules a reconnect and
//! drops back to zero on every successful open, so the cap bounds
//! consecutive failures rather than the lifetime total.

use crate::backoff::BackoffStrategy;
use std::time::Duration;

/// Lifecycle state of one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Handshake in flight
    Connecting,
    /// Handshake completed, frames flowing
    Open,
    /// Connection ended; a reconnect may be pending
    Closed,
}


/// State and reconnect counter of one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeState {
    state: ConnectionState,
    reconnect_attempts: u32,
    reconnect_pending: bool,
}

impl ScopeState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
            reconnect_pending: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether a reconnect timer is running for this scope
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Handshake started
    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.reconnect_pending = false;
    }

    /// Handshake completed; the counter resets
    pub fn opened(&mut self) {
        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
    }

    /// Connection ended
    pub fn closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Decide whether to reconnect after a transient close
    ///
    /// Returns the delay and the 1-based attempt number, advancing the
    /// counter. `None` once the strategy refuses the current count.
    pub fn schedule_reconnect(&mut self, strategy: &dyn BackoffStrategy) -> Option<(Duration, u32)> {
        let delay = strategy.next_delay(self.reconnect_attempts)?;
        self.reconnect_attempts += 1;
        self.reconnect_pending = true;
        Some((delay, self.reconnect_attempts))
    }

    /// The scope will not reconnect any more
    pub fn abandon_reconnect(&mut self) {
        self.reconnect_pending = false;
    }
}

impl Default for ScopeState {
    fn default() -> Self {
        Self::new()
    }
}
