//! Exponential reconnect delay.

use std::time::Duration;

/// Floor for both the base and the cap.
pub const MIN_DELAY: Duration = Duration::from_millis(10);

/// Doubling delay: base, 2×base, 4×base, … capped at `max`. Neither is ever
/// below [`MIN_DELAY`].
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(MIN_DELAY);
        let base = base.clamp(MIN_DELAY, max);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// The delay to wait now; doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to `base`, after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}
