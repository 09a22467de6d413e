use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of tokens a single request consumes
pub(crate) const DEFAULT_COST: f64 = 1.0;

/// Default time a token bucket waiter sleeps between refill checks
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration of a [`crate::throttle::LeakyBucket`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeakyBucketConfig {
    /// Maximum admissions per second
    pub ceiling: f64,
}

impl LeakyBucketConfig {
    /// Create a config admitting at most `ceiling` requests per second
    #[must_use]
    pub const fn new(ceiling: f64) -> Self {
        Self { ceiling }
    }
}

/// Configuration of a [`crate::throttle::TokenBucket`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenBucketConfig {
    /// Tokens added per second
    pub refill_rate: f64,

    /// Maximum token balance; the bucket starts full
    pub capacity: f64,

    /// Tokens consumed by each admission
    #[serde(default = "default_cost")]
    pub cost: f64,

    /// Time a waiter sleeps between refill checks.
    ///
    /// Waiters re-check at this granularity rather than sleeping for exactly
    /// the time until enough tokens accrue. Coarse intervals over-wait near
    /// the capacity boundary; fine intervals cost more wake-ups.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Default number of tokens per request
const fn default_cost() -> f64 {
    DEFAULT_COST
}

/// Default interval between refill checks
const fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl TokenBucketConfig {
    /// Create a `TokenBucketConfig` from CLI options, using defaults for
    /// missing values.
    ///
    /// The capacity defaults to one second's worth of refill, so a run can
    /// burst up to its per-second rate.
    #[must_use]
    pub fn from_options(
        refill_rate: f64,
        capacity: Option<f64>,
        cost: Option<f64>,
        poll_interval: Option<Duration>,
    ) -> Self {
        Self {
            refill_rate,
            capacity: capacity.unwrap_or(refill_rate),
            cost: cost.unwrap_or(DEFAULT_COST),
            poll_interval: poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_token_bucket_defaults() {
        let config = TokenBucketConfig::from_options(4.0, None, None, None);
        assert_eq!(config.capacity, 4.0);
        assert_eq!(config.cost, 1.0);
        assert_eq!(config.poll_interval, Duration::from_secs(1));

        let config = TokenBucketConfig::from_options(
            4.0,
            Some(10.0),
            Some(2.0),
            Some(Duration::from_millis(100)),
        );
        assert_eq!(config.capacity, 10.0);
        assert_eq!(config.cost, 2.0);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_config_deserialization() {
        let config: TokenBucketConfig = toml::from_str(
            r#"
            refill_rate = 5.0
            capacity = 8.0
            poll_interval = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.cost, DEFAULT_COST);
        assert_eq!(config.poll_interval, Duration::from_millis(250));

        let err = toml::from_str::<LeakyBucketConfig>("ceiling = 2.0\nburst = 3").unwrap_err();
        assert!(err.to_string().contains("burst"));
    }

    #[test]
    fn test_config_serialization() {
        let config = TokenBucketConfig::from_options(3.0, None, None, Some(Duration::from_millis(200)));
        let toml = toml::to_string(&config).unwrap();
        let deserialized: TokenBucketConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, deserialized);
    }
}
