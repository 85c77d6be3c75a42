//! Poll timeout policy.
//!
//! Foreign callers pass a signed millisecond count. Non-positive values mean
//! "use the default", and nothing may make a poll wait forever.

use std::time::Duration;

/// Wait used when the caller passes zero or a negative timeout.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;

/// Longest a single poll may block.
pub const MAX_POLL_TIMEOUT_MS: u64 = 300_000;

/// Turns caller-supplied poll timeouts into bounded waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    default_ms: u64,
    max_ms: u64,
}

impl PollTimeout {
    /// Create a policy. `max_ms` is raised to `default_ms` if smaller.
    pub fn new(default_ms: u64, max_ms: u64) -> Self {
        Self {
            default_ms,
            max_ms: max_ms.max(default_ms),
        }
    }

    /// Resolve a requested timeout into the duration poll will wait.
    pub fn resolve(&self, requested_ms: i64) -> Duration {
        let ms = if requested_ms <= 0 {
            self.default_ms
        } else {
            (requested_ms as u64).min(self.max_ms)
        };
        Duration::from_millis(ms)
    }

    /// Default wait in milliseconds.
    pub fn default_ms(&self) -> u64 {
        self.default_ms
    }

    /// Ceiling in milliseconds.
    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }
}

impl Default for PollTimeout {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_TIMEOUT_MS, MAX_POLL_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_uses_default() {
        let policy = PollTimeout::default();
        assert_eq!(policy.resolve(0), Duration::from_millis(1000));
        assert_eq!(policy.resolve(-5), Duration::from_millis(1000));
        assert_eq!(policy.resolve(i64::MIN), Duration::from_millis(1000));
    }

    #[test]
    fn positive_passes_through() {
        let policy = PollTimeout::default();
        assert_eq!(policy.resolve(1), Duration::from_millis(1));
        assert_eq!(policy.resolve(5000), Duration::from_millis(5000));
    }

    #[test]
    fn huge_values_are_clamped() {
        let policy = PollTimeout::default();
        assert_eq!(policy.resolve(i64::MAX), Duration::from_millis(MAX_POLL_TIMEOUT_MS));
    }

    #[test]
    fn max_never_below_default() {
        let policy = PollTimeout::new(2000, 10);
        assert_eq!(policy.max_ms(), 2000);
        assert_eq!(policy.default_ms(), 2000);
        assert_eq!(policy.resolve(50_000), Duration::from_millis(2000));
    }
}
