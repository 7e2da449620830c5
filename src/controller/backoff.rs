//! # Exponential Backoff
//!
//! Per-key retry delays for failed reconciliations.
//!
//! The delay doubles with every failed attempt, starting at the base delay and
//! capped at the maximum. The queue keeps the attempt counter per key, so the
//! calculator itself is stateless and can be shared by every worker.
//!
//! ## Usage
//!
//! ```rust
//! use autoreplica_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));
//! assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
//! assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
//! assert_eq!(backoff.delay_for(5), Duration::from_secs(10)); // capped
//! ```

use rand::Rng;
use std::time::Duration;

/// Exponential backoff calculator
///
/// `delay_for(n)` is `base * 2^(n-1)` capped at `max`. With jitter enabled the
/// delay is drawn uniformly from the upper half of that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given base and cap
    ///
    /// A cap smaller than the base is raised to the base.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: false,
        }
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    ///
    /// Attempt 0 is treated as attempt 1.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);
        if self.jitter {
            jittered(capped)
        } else {
            capped
        }
    }

    /// The base delay
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// The maximum delay
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

fn jittered(delay: Duration) -> Duration {
    let upper = delay.as_millis();
    let lower = upper / 2;
    if upper == lower {
        return delay;
    }
    let millis = rand::rng().random_range(lower..=upper);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}
