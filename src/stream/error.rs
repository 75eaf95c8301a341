//! Error types and retry policy for the streaming layer

use std::time::Duration;
use thiserror::Error;

/// Error type for streaming operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Reconnect attempt ceiling reached; the connection is terminal until
    /// the caller reconnects explicitly
    #[error("Reconnect limit exceeded after {0} attempts")]
    ReconnectLimitExceeded(u32),

    /// The server reported an error frame
    #[error("Server error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },
}

impl StreamError {
    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::ReconnectLimitExceeded(_) => "reconnect_limit",
            Self::Server { .. } => "server",
        }
    }
}

/// Exponential backoff policy for reconnect scheduling
///
/// `delay = min(base * 2^attempt, cap)`. Deterministic: consecutive delays
/// are non-decreasing and bounded above by the cap.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_attempt: u32,
    base_delay_ms: u64,
    cap_delay_ms: u64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    pub fn new(base_delay_ms: u64, cap_delay_ms: u64) -> Self {
        Self {
            current_attempt: 0,
            base_delay_ms,
            cap_delay_ms,
        }
    }

    /// Get the next backoff duration and advance the attempt counter
    pub fn next_backoff(&mut self) -> Duration {
        let shift = self.current_attempt.min(63);
        let delay_ms = self
            .base_delay_ms
            .checked_shl(shift)
            .unwrap_or(self.cap_delay_ms)
            .min(self.cap_delay_ms);
        self.current_attempt += 1;
        Duration::from_millis(delay_ms)
    }

    /// Reset the backoff to initial state (called once a connection opens)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get current attempt number
    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}
