//! Polling policy: how often the gateway is asked and for how long.

use std::time::Duration;

/// Default delay between two status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default attempt budget.  With the default interval the QR code expires
/// after one minute.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Interval and attempt budget for one pairing session.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use wa_pairing_core::PollingPolicy;
///
/// let policy = PollingPolicy::default();
/// assert_eq!(policy.total_timeout(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Delay between two ticks of the polling loop.
    pub interval: Duration,
    /// Tick number at which the session is declared timed out.
    pub max_attempts: u32,
}

impl PollingPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Wall-clock time between the pairing code appearing and the timeout.
    pub fn total_timeout(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }

    /// Time left before the timeout, given the number of ticks already run.
    pub fn remaining(&self, attempt: u32) -> Duration {
        self.interval
            .saturating_mul(self.max_attempts.saturating_sub(attempt))
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}
