use std::time::Duration;

/// Backoff schedule applied when the hub drops the connection. Attempts are
/// numbered from 1; once `max_attempts` have been scheduled the client stays
/// disconnected until an explicit `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        // 2^10 already exceeds any sane max_delay/base_delay ratio.
        let factor = 1u32 << exponent.min(10);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts > self.max_attempts
    }
}
