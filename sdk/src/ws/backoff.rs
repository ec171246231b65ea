//! Reconnect delay schedule.

use std::time::Duration;

use super::config::ClientConfig;

/// Multiplicative backoff between reconnect attempts.
///
/// [`Backoff::next_delay`] hands out the current delay and grows it by
/// `factor`, truncated to whole milliseconds and capped at `ceiling`.
/// [`Backoff::reset`] drops it back to `floor` after a successful open.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `floor`.
    #[must_use]
    pub fn new(floor: Duration, factor: f64, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            factor,
            current: floor.min(ceiling),
        }
    }

    /// Creates a backoff from client configuration.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.reconnect_floor,
            config.backoff_factor,
            config.reconnect_ceiling,
        )
    }

    /// Returns the delay that the next scheduled reconnect would wait.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Returns the delay for the next reconnect and grows the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown_ms = (self.current.as_millis() as f64 * self.factor).floor() as u64;
        self.current = Duration::from_millis(grown_ms).min(self.ceiling);
        delay
    }

    /// Resets the delay to the floor.
    pub fn reset(&mut self) {
        self.current = self.floor.min(self.ceiling);
    }
}
