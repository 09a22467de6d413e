use std::time::Duration;

use thiserror::Error;

use crate::throttle::Algorithm;

/// Possible errors when shaping traffic with `drip_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The configured admission rate is not a positive number, or too large
    /// to keep track of
    #[error("Cannot build {algorithm} limiter: rate must be a positive number in range, got {rate}")]
    InvalidRate {
        /// The limiter that failed to build
        algorithm: Algorithm,
        /// The rejected rate
        rate: f64,
    },

    /// The token bucket capacity is zero, negative, or not a number
    #[error("Cannot build {algorithm} limiter: capacity must be a positive number, got {capacity}")]
    InvalidCapacity {
        /// The limiter that failed to build
        algorithm: Algorithm,
        /// The rejected capacity
        capacity: f64,
    },

    /// The per-request token cost is zero, negative, or not a number
    #[error("Cannot build {algorithm} limiter: cost per request must be a positive number, got {cost}")]
    InvalidCost {
        /// The limiter that failed to build
        algorithm: Algorithm,
        /// The rejected cost
        cost: f64,
    },

    /// A single request costs more tokens than the bucket can ever hold
    #[error(
        "Cannot build {algorithm} limiter: cost per request ({cost}) exceeds capacity ({capacity}), no request could ever be admitted"
    )]
    CostExceedsCapacity {
        /// The limiter that failed to build
        algorithm: Algorithm,
        /// Tokens consumed per admission
        cost: f64,
        /// Maximum token balance
        capacity: f64,
    },

    /// Waiters would never yield between refill checks
    #[error("Cannot build {algorithm} limiter: poll interval must not be zero")]
    InvalidPollInterval {
        /// The limiter that failed to build
        algorithm: Algorithm,
    },

    /// The time source reported an instant earlier than one already recorded
    #[error("Clock went backwards by {0:?}; rate computations are undefined")]
    ClockAnomaly(Duration),

    /// The target cannot be turned into a URL
    #[error("Cannot parse target `{0}` as a URL: {1}")]
    InvalidTarget(String, url::ParseError),

    /// The given header could not be parsed
    #[error("Header could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The HTTP client could not be created
    #[error("Failed to build HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),

    /// The request never produced a response (connection refused, timeout, ...)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// A request task panicked before reporting back
    #[error("Request task failed: {0}")]
    TaskJoin(String),
}

impl ErrorKind {
    /// Returns `true` for errors raised while building a limiter, a target, or
    /// a requester; these abort a run before any request is issued.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidRate { .. }
                | Self::InvalidCapacity { .. }
                | Self::InvalidCost { .. }
                | Self::CostExceedsCapacity { .. }
                | Self::InvalidPollInterval { .. }
                | Self::InvalidTarget(..)
                | Self::InvalidHeader(_)
                | Self::BuildClient(_)
        )
    }

    /// Returns `true` if the request failed because the target timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_name_the_limiter() {
        let err = ErrorKind::CostExceedsCapacity {
            algorithm: Algorithm::TokenBucket,
            cost: 3.0,
            capacity: 2.0,
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("token bucket"));

        let err = ErrorKind::InvalidRate {
            algorithm: Algorithm::LeakyBucket,
            rate: 0.0,
        };
        assert!(err.to_string().starts_with("Cannot build leaky bucket limiter"));
    }

    #[test]
    fn test_runtime_errors_are_not_configuration() {
        let err = ErrorKind::ClockAnomaly(Duration::from_millis(3));
        assert!(!err.is_configuration());
        assert!(!err.is_timeout());
        assert!(!ErrorKind::TaskJoin("boom".into()).is_configuration());
    }
}
