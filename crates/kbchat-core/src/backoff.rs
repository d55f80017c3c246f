//! Reconnect delay policies.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// How long to wait before each reconnect attempt.
///
/// Retries never stop; only the spacing between them differs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// The same delay before every attempt.
    Fixed {
        /// Delay in milliseconds.
        #[serde(default = "default_initial_ms")]
        delay_ms: u64,
    },
    /// Delay multiplied after each failed attempt, capped, with random spread.
    Exponential {
        /// Delay before the first attempt, in milliseconds.
        #[serde(default = "default_initial_ms")]
        initial_ms: u64,
        /// Upper bound for any delay, in milliseconds.
        #[serde(default = "default_max_ms")]
        max_ms: u64,
        /// Growth factor per attempt.
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        /// Relative spread in `[0, 1]`; 0.2 means ±20%.
        #[serde(default = "default_jitter")]
        jitter: f64,
    },
}

const fn default_initial_ms() -> u64 {
    3000
}

const fn default_max_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> f64 {
    0.2
}

impl ReconnectPolicy {
    /// A fixed-interval policy.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Attempt counter for a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Start counting attempts under `policy`.
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Forget previous failures, typically after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Delay before the next attempt, drawing jitter from `rng`.
    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let attempt = self.attempt;
        self.attempt = self.attempt.saturating_add(1);

        match self.policy {
            ReconnectPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            ReconnectPolicy::Exponential {
                initial_ms,
                max_ms,
                multiplier,
                jitter,
            } => {
                #[allow(clippy::cast_precision_loss)]
                let (initial, max) = (initial_ms as f64, max_ms as f64);
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let base = (initial * multiplier.max(1.0).powi(exponent)).min(max);

                let jitter = jitter.clamp(0.0, 1.0);
                let spread = if jitter > 0.0 {
                    rng.gen_range(-jitter..=jitter)
                } else {
                    0.0
                };

                let millis = (base * (1.0 + spread)).clamp(0.0, max);
                Duration::from_secs_f64(millis / 1000.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn exponential(jitter: f64) -> ReconnectPolicy {
        ReconnectPolicy::Exponential {
            initial_ms: 1000,
            max_ms: 8000,
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn fixed_policy_never_changes() {
        let mut backoff = Backoff::new(ReconnectPolicy::fixed(DEFAULT_RECONNECT_DELAY));
        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(3000));
        }
        assert_eq!(backoff.attempt(), 5);
    }

    #[test]
    fn exponential_doubles_until_cap() {
        let mut backoff = Backoff::new(exponential(0.0));
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 8000, 8000]);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::new(exponential(0.0));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_bounds_and_cap() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = Backoff::new(exponential(0.5));
        for attempt in 0..20 {
            let delay = backoff.next_delay_with(&mut rng).as_secs_f64() * 1000.0;
            let base = (1000.0 * 2f64.powi(attempt)).min(8000.0);
            assert!(delay >= base * 0.5 - 1e-6, "attempt {attempt}: {delay}");
            assert!(delay <= 8000.0 + 1e-6, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut backoff = Backoff::new(exponential(0.0));
        backoff.attempt = u32::MAX - 1;
        assert_eq!(backoff.next_delay(), Duration::from_millis(8000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(8000));
    }

    #[test]
    fn policy_deserializes_from_toml() {
        let fixed: ReconnectPolicy = toml::from_str("kind = \"fixed\"\ndelay_ms = 500").unwrap();
        assert_eq!(fixed, ReconnectPolicy::Fixed { delay_ms: 500 });

        let exp: ReconnectPolicy = toml::from_str("kind = \"exponential\"").unwrap();
        assert_eq!(exp, ReconnectPolicy::default());
    }
}
