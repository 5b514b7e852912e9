use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule for transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 2000,
            max_backoff_ms: 10000,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// No waiting at all; for tests.
    pub fn immediate() -> Self {
        Self::new(0, 0)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Exponential backoff state for one `extract` call.
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    /// Delay before the next attempt. A server-supplied `Retry-After` wins when
    /// it is longer than our own schedule, still capped at the maximum.
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let scheduled = self.next;
        self.next = std::cmp::min(self.next * 2, self.max);

        let delay = match hint {
            Some(hint) if hint > scheduled => hint,
            _ => scheduled,
        };
        std::cmp::min(delay, self.max)
    }
}
