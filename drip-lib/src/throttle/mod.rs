//! Admission control for outbound requests.
//!
//! Two behaviourally distinct strategies implement the [`Throttle`] contract:
//!
//! - [`LeakyBucket`]: estimates the realized rate over a sliding window of
//!   recent admissions and delays callers until that rate is back under the
//!   ceiling. Bursts are smoothed into a steady drain.
//! - [`TokenBucket`]: keeps a token balance that refills continuously up to a
//!   capacity. Bursts up to the capacity pass immediately; the sustained rate
//!   is capped by the refill rate.
//!
//! Neither strategy hands out admissions in FIFO order. A waiter that computed
//! a shorter delay may be admitted before one that started waiting earlier.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, VariantNames};

use crate::Result;

mod config;
mod leaky;
mod token;
mod window;

pub use config::{LeakyBucketConfig, TokenBucketConfig};
pub use leaky::LeakyBucket;
pub use token::TokenBucket;

/// The throttling strategy
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
)]
#[non_exhaustive]
pub enum Algorithm {
    /// Sliding-window rate estimate, smooths bursts
    #[default]
    #[serde(rename = "leaky")]
    #[strum(
        serialize = "leaky",
        serialize = "leaky-bucket",
        to_string = "leaky bucket",
        ascii_case_insensitive
    )]
    LeakyBucket,

    /// Continuously refilled token balance, permits bursts
    #[serde(rename = "token")]
    #[strum(
        serialize = "token",
        serialize = "token-bucket",
        to_string = "token bucket",
        ascii_case_insensitive
    )]
    TokenBucket,
}

/// A gate that concurrent request tasks pass through before issuing work.
///
/// Implementations are shared between tasks (usually behind an `Arc`) and
/// must keep their bookkeeping consistent under concurrent callers.
#[async_trait]
pub trait Throttle: Send + Sync + Debug {
    /// Wait until the caller may proceed.
    ///
    /// # Errors
    ///
    /// Fails only if the time source misbehaves, see
    /// [`crate::ErrorKind::ClockAnomaly`].
    async fn acquire(&self) -> Result<()>;

    /// Hand back an admission.
    ///
    /// Nothing is held after admission for either strategy, so this is a
    /// no-op by default. It exists so that [`Permit`] can scope an admission.
    fn release(&self) {}

    /// The strategy implemented by this throttle
    fn algorithm(&self) -> Algorithm;
}

/// RAII guard for an admission, released when dropped.
///
/// ```
/// use drip_lib::throttle::{LeakyBucket, Permit};
///
/// # #[tokio::main]
/// # async fn main() -> drip_lib::Result<()> {
/// let throttle = LeakyBucket::new(10.0)?;
/// let permit = Permit::acquire(&throttle).await?;
/// // issue the request while holding `permit`
/// drop(permit);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "dropping a permit releases the admission immediately"]
pub struct Permit<'a> {
    throttle: &'a dyn Throttle,
}

impl<'a> Permit<'a> {
    /// Acquire an admission from `throttle`
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Throttle::acquire`].
    pub async fn acquire(throttle: &'a dyn Throttle) -> Result<Permit<'a>> {
        throttle.acquire().await?;
        Ok(Self { throttle })
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.throttle.release();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct Counting {
        acquired: AtomicUsize,
        released: AtomicUsize,
    }

    #[async_trait]
    impl Throttle for Counting {
        async fn acquire(&self) -> Result<()> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn algorithm(&self) -> Algorithm {
            Algorithm::LeakyBucket
        }
    }

    #[tokio::test]
    async fn test_permit_releases_on_drop() {
        let throttle = Counting::default();
        {
            let _permit = Permit::acquire(&throttle).await.unwrap();
            assert_eq!(throttle.acquired.load(Ordering::SeqCst), 1);
            assert_eq!(throttle.released.load(Ordering::SeqCst), 0);
        }
        assert_eq!(throttle.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(Algorithm::from_str("leaky").unwrap(), Algorithm::LeakyBucket);
        assert_eq!(Algorithm::from_str("Token").unwrap(), Algorithm::TokenBucket);
        assert_eq!(
            Algorithm::from_str("token-bucket").unwrap(),
            Algorithm::TokenBucket
        );
        assert!(Algorithm::from_str("sliding").is_err());
        assert_eq!(Algorithm::LeakyBucket.to_string(), "leaky bucket");
    }
}
