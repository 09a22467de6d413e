use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Algorithm, Throttle, TokenBucketConfig};
use crate::clock::{Clock, TokioClock, elapsed_since};
use crate::{ErrorKind, Result};

/// Token bucket throttle.
///
/// The bucket starts full. Every admission consumes `cost` tokens, and tokens
/// flow back in at `refill_rate` per second up to `capacity`. A burst of up to
/// `capacity / cost` requests is admitted at once; after that the sustained
/// rate converges to `refill_rate / cost`.
///
/// Waiters re-check the balance every `poll_interval` instead of sleeping for
/// exactly the time it takes to accrue the missing tokens.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    cost: f64,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<TokenState>,
}

#[derive(Debug)]
struct TokenState {
    /// Always within `[0, capacity]`
    balance: f64,
    /// Only moves forward
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a token bucket from its configuration, timed by the tokio clock
    ///
    /// # Errors
    ///
    /// Returns an error if a rate, capacity, or cost is not a finite positive
    /// number, if `cost` exceeds `capacity`, or if `poll_interval` is zero.
    pub fn new(config: &TokenBucketConfig) -> Result<Self> {
        Self::from_config(config, Arc::new(TokioClock))
    }

    /// Create a token bucket timed by the given clock
    ///
    /// # Errors
    ///
    /// See [`TokenBucket::new`].
    pub fn from_config(config: &TokenBucketConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let TokenBucketConfig {
            refill_rate,
            capacity,
            cost,
            poll_interval,
        } = *config;
        let algorithm = Algorithm::TokenBucket;

        if !is_positive(refill_rate) {
            return Err(ErrorKind::InvalidRate {
                algorithm,
                rate: refill_rate,
            });
        }
        if !is_positive(capacity) {
            return Err(ErrorKind::InvalidCapacity {
                algorithm,
                capacity,
            });
        }
        if !is_positive(cost) {
            return Err(ErrorKind::InvalidCost { algorithm, cost });
        }
        if cost > capacity {
            return Err(ErrorKind::CostExceedsCapacity {
                algorithm,
                cost,
                capacity,
            });
        }
        if poll_interval.is_zero() {
            return Err(ErrorKind::InvalidPollInterval { algorithm });
        }

        let last_refill = clock.now();
        Ok(Self {
            capacity,
            refill_rate,
            cost,
            poll_interval,
            clock,
            state: Mutex::new(TokenState {
                balance: capacity,
                last_refill,
            }),
        })
    }

    /// Current token balance
    #[must_use]
    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    /// Time of the last balance update
    #[must_use]
    pub fn last_refill(&self) -> Instant {
        self.state.lock().last_refill
    }

    /// Maximum token balance
    #[must_use]
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Credit the tokens accrued since the last refill.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ClockAnomaly`] if the clock reports an instant
    /// before the last refill.
    pub fn refill(&self) -> Result<()> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.refill_at(&mut state, now)
    }

    fn refill_at(&self, state: &mut TokenState, now: Instant) -> Result<()> {
        let elapsed = elapsed_since(now, state.last_refill)?;
        let new_tokens = elapsed.as_secs_f64() * self.refill_rate;

        // Repeated polls within the same instant add nothing and must not
        // move the refill mark
        if new_tokens > 0.0 {
            state.balance = (state.balance + new_tokens).min(self.capacity);
            state.last_refill = now;
        }
        Ok(())
    }

    /// Refill, then take `cost` tokens if the balance allows it.
    ///
    /// The clock is read under the lock so the refill mark never sees an
    /// instant older than one a concurrent caller already recorded.
    fn try_take(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.refill_at(&mut state, now)?;

        if state.balance >= self.cost {
            state.balance -= self.cost;
            return Ok(true);
        }

        debug!(
            "Waiting for tokens: require {} tokens, currently have {:.2}",
            self.cost, state.balance
        );
        Ok(false)
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[async_trait]
impl Throttle for TokenBucket {
    async fn acquire(&self) -> Result<()> {
        while !self.try_take()? {
            self.clock.sleep(self.poll_interval).await;
        }
        Ok(())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }
}
