//! Time source and suspension capability used by the throttles.
//!
//! Throttles never read ambient time. They are handed a [`Clock`] at
//! construction, which makes their timing behaviour reproducible in tests.
//! [`TokioClock`] is backed by [`tokio::time`], so a runtime started with a
//! paused clock (`#[tokio::test(start_paused = true)]`) drives every throttle
//! deterministically.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{ErrorKind, Result};

/// A monotonic time source that can also suspend the calling task
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// The current instant
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Time elapsed from `earlier` to `now`.
///
/// # Errors
///
/// Returns [`ErrorKind::ClockAnomaly`] if `now` lies before `earlier`.
pub(crate) fn elapsed_since(now: Instant, earlier: Instant) -> Result<Duration> {
    now.checked_duration_since(earlier)
        .ok_or_else(|| ErrorKind::ClockAnomaly(earlier - now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps_on_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(1500)).await;
        let slept = clock.now() - start;
        assert!(slept >= Duration::from_millis(1500));
        assert!(slept < Duration::from_millis(1510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_since() {
        let earlier = Instant::now();
        let later = earlier + Duration::from_secs(2);

        assert_eq!(elapsed_since(later, earlier).unwrap(), Duration::from_secs(2));
        assert_eq!(elapsed_since(earlier, earlier).unwrap(), Duration::ZERO);
        assert!(matches!(
            elapsed_since(earlier, later),
            Err(ErrorKind::ClockAnomaly(d)) if d == Duration::from_secs(2)
        ));
    }
}
