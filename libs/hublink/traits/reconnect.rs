use std::time::Duration;

/// Default retry delays for the manager's outer retry loop
pub const DEFAULT_RETRY_DELAYS: [Duration; 5] = [
    Duration::from_secs(0),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(15),
];

/// Default cap on consecutive retry attempts
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Delay schedule consulted between connection attempts
///
/// A strategy is a pure function of the attempt count: it holds no
/// state, and the caller owns the counter.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before retry number `attempt` (0-indexed), or `None` once
    /// the schedule is exhausted
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Whether retry number `attempt` is still allowed
    fn should_reconnect(&self, attempt: usize) -> bool;
}

/// Fixed delay table with a hard attempt cap
///
/// Attempt `n` waits `delays[n]`; attempts past the end of the table
/// reuse the last entry until `max_attempts` is reached. Delays are
/// sorted on construction so the schedule never decreases.
#[derive(Debug, Clone)]
pub struct DelayTable {
    delays: Vec<Duration>,
    max_attempts: usize,
}

impl DelayTable {
    /// Create a new delay table strategy
    ///
    /// # Arguments
    /// * `delays` - Delay per attempt; an empty table means "retry immediately"
    /// * `max_attempts` - Number of retries before giving up
    pub fn new(delays: impl Into<Vec<Duration>>, max_attempts: usize) -> Self {
        let mut delays = delays.into();
        delays.sort();
        Self {
            delays,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl Default for DelayTable {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAYS.to_vec(), DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReconnectionStrategy for DelayTable {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let index = attempt.min(self.delays.len().saturating_sub(1));
        Some(self.delays.get(index).copied().unwrap_or(Duration::ZERO))
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

/// Doubling delay, `initial_delay * 2^attempt` up to `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: usize,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: usize) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let factor = 2u64.saturating_pow(attempt.min(32) as u32);
        let delay = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Some(Duration::from_millis(delay.min(self.max_delay.as_millis() as u64)))
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

/// Retry schedule with no entries
///
/// The manager stays `Failed` after the first failure until the
/// caller connects again.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn should_reconnect(&self, _attempt: usize) -> bool {
        false
    }
}
