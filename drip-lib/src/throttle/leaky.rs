use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::window::Window;
use super::{Algorithm, LeakyBucketConfig, Throttle};
use crate::clock::{Clock, TokioClock, elapsed_since};
use crate::{ErrorKind, Result};

/// Shortest suspension of a throttled caller, so that a saturated window
/// never turns the retry loop into a busy spin
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Relative slack on the ceiling that absorbs nanosecond truncation of the
/// timestamps, e.g. a 1/3 s spacing measured as 333 333 333 ns
const RATE_TOLERANCE: f64 = 1e-6;

/// Leaky bucket throttle.
///
/// Keeps the timestamps of the most recent admissions (at most one second's
/// worth at the ceiling rate) and derives the realized rate from them. While
/// that rate is above the ceiling, callers back off proportionally to how many
/// of them are queued, which spreads bursts into a steady drain.
#[derive(Debug)]
pub struct LeakyBucket {
    /// Maximum admissions per second
    ceiling: f64,

    /// Seconds between two admissions at the ceiling rate
    interval: f64,

    clock: Arc<dyn Clock>,

    state: Mutex<LeakyState>,
}

#[derive(Debug)]
struct LeakyState {
    /// Admission timestamps, oldest first
    admissions: Window<Instant>,

    /// Callers currently waiting inside `acquire`
    in_flight: usize,
}

impl LeakyBucket {
    /// Create a leaky bucket admitting at most `ceiling` requests per second,
    /// timed by the tokio clock.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRate`] unless `ceiling` is a finite,
    /// positive number small enough to size the admission window.
    pub fn new(ceiling: f64) -> Result<Self> {
        Self::with_clock(ceiling, Arc::new(TokioClock))
    }

    /// Create a leaky bucket from its configuration
    ///
    /// # Errors
    ///
    /// See [`LeakyBucket::new`].
    pub fn from_config(config: &LeakyBucketConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_clock(config.ceiling, clock)
    }

    /// Create a leaky bucket timed by the given clock
    ///
    /// # Errors
    ///
    /// See [`LeakyBucket::new`].
    pub fn with_clock(ceiling: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        // The window holds one second's worth of admissions at the ceiling,
        // so its size must fit in a usize
        #[allow(clippy::cast_precision_loss)]
        let max_ceiling = usize::MAX as f64;
        if !ceiling.is_finite() || ceiling <= 0.0 || ceiling.ceil() >= max_ceiling {
            return Err(ErrorKind::InvalidRate {
                algorithm: Algorithm::LeakyBucket,
                rate: ceiling,
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capacity = ceiling.ceil() as usize;

        Ok(Self {
            ceiling,
            interval: 1.0 / ceiling,
            clock,
            state: Mutex::new(LeakyState {
                admissions: Window::new(capacity),
                in_flight: 0,
            }),
        })
    }

    /// Number of callers currently waiting for admission
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Timestamps of the retained admissions, oldest first
    #[must_use]
    pub fn admissions(&self) -> Vec<Instant> {
        self.state.lock().admissions.iter().copied().collect()
    }

    /// Maximum number of admissions retained for the rate estimate
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.state.lock().admissions.capacity()
    }

    /// Admit the caller if the realized rate allows it, otherwise return how
    /// long to back off before asking again.
    ///
    /// The clock is read, the rate checked, and the admission recorded under
    /// one lock. Concurrent callers can neither both slip under the ceiling
    /// nor record their admissions out of order.
    fn try_admit(&self) -> Result<Option<Duration>> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        if let (Some(&earliest), Some(&latest)) =
            (state.admissions.first(), state.admissions.last())
        {
            let span = elapsed_since(now, earliest)?.as_secs_f64();
            let since_latest = elapsed_since(now, latest)?.as_secs_f64();

            #[allow(clippy::cast_precision_loss)]
            let admitted = state.admissions.len() as f64;
            let current_rate = if span > 0.0 {
                admitted / span
            } else {
                f64::INFINITY
            };

            if current_rate > self.ceiling * (1.0 + RATE_TOLERANCE) {
                #[allow(clippy::cast_precision_loss)]
                let queued = state.in_flight as f64;
                let backlog = queued * self.interval - since_latest;
                // With a non-positive backlog, wait until the window itself
                // drains back to the ceiling.
                let delay = if backlog > 0.0 {
                    backlog
                } else {
                    admitted / self.ceiling - span
                };
                let delay = Duration::from_secs_f64(delay.max(0.0)).max(MIN_BACKOFF);

                debug!(
                    "Throttling: current rate of {current_rate:.2}/s exceeds ceiling of {}/s, backing off for {}ms ({} queued)",
                    self.ceiling,
                    delay.as_millis(),
                    state.in_flight
                );
                return Ok(Some(delay));
            }

            trace!(
                "Admitting: current rate of {current_rate:.2}/s is within ceiling of {}/s",
                self.ceiling
            );
        }

        state.admissions.push(now);
        Ok(None)
    }
}

/// Counts a caller as queued for as long as it is inside `acquire`, including
/// when its future is dropped mid-wait.
struct Queued<'a>(&'a Mutex<LeakyState>);

impl<'a> Queued<'a> {
    fn enter(state: &'a Mutex<LeakyState>) -> Self {
        state.lock().in_flight += 1;
        Self(state)
    }
}

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

#[async_trait]
impl Throttle for LeakyBucket {
    async fn acquire(&self) -> Result<()> {
        let _queued = Queued::enter(&self.state);
        while let Some(delay) = self.try_admit()? {
            self.clock.sleep(delay).await;
        }
        Ok(())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeakyBucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::task::JoinSet;

    /// Largest number of admissions inside any half-open window of `width`
    fn max_in_window(admissions: &[Instant], width: Duration) -> usize {
        admissions
            .iter()
            .map(|start| {
                admissions
                    .iter()
                    .filter(|t| **t >= *start && **t < *start + width)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[rstest]
    #[case(0.0)]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(1e20)]
    fn test_rejects_invalid_ceiling(#[case] ceiling: f64) {
        let err = LeakyBucket::new(ceiling).unwrap_err();
        assert!(matches!(
            err,
            ErrorKind::InvalidRate {
                algorithm: Algorithm::LeakyBucket,
                ..
            }
        ));
        assert!(err.to_string().contains("leaky bucket"));
    }

    #[rstest]
    #[case(1.0, 1)]
    #[case(2.0, 2)]
    #[case(2.5, 3)]
    #[case(0.5, 1)]
    fn test_window_capacity(#[case] ceiling: f64, #[case] capacity: usize) {
        assert_eq!(LeakyBucket::new(ceiling).unwrap().window_capacity(), capacity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_ceiling() {
        let bucket = LeakyBucket::new(1e9).unwrap();
        assert_eq!(bucket.window_capacity(), 1_000_000_000);

        join_all((0..100).map(|_| bucket.acquire())).await;
        assert_eq!(bucket.admissions().len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_caller_is_not_throttled() {
        let bucket = LeakyBucket::new(1.0).unwrap();
        let start = Instant::now();
        bucket.acquire().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(bucket.admissions().len(), 1);
        assert_eq!(bucket.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_spread_to_ceiling() {
        let bucket = LeakyBucket::new(2.0).unwrap();
        let start = Instant::now();

        let admitted: Vec<Instant> = join_all((0..10).map(|_| async {
            bucket.acquire().await.unwrap();
            Instant::now()
        }))
        .await;

        // 10 admissions at 2/s need at least (10 - 1) / 2 seconds
        assert!(start.elapsed() >= Duration::from_millis(4500));

        let mut admitted = admitted;
        admitted.sort();
        assert!(max_in_window(&admitted, Duration::from_secs(1)) <= 2 + 1);
        assert_eq!(bucket.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_is_bounded_and_monotonic() {
        let bucket = LeakyBucket::new(3.0).unwrap();

        join_all((0..12).map(|_| bucket.acquire())).await;

        let log = bucket.admissions();
        assert!(log.len() <= 3);
        assert!(log.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_callers_pass_without_delay() {
        let bucket = LeakyBucket::new(2.0).unwrap();
        let clock = TokioClock;

        for _ in 0..5 {
            let before = Instant::now();
            bucket.acquire().await.unwrap();
            assert_eq!(before.elapsed(), Duration::ZERO);
            clock.sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_leaves_queue() {
        let bucket = LeakyBucket::new(1.0).unwrap();
        bucket.acquire().await.unwrap();

        // The second caller is throttled; give up on it mid-wait
        let waited = tokio::time::timeout(Duration::from_millis(100), bucket.acquire()).await;
        assert!(waited.is_err());
        assert_eq!(bucket.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_callers() {
        let bucket = Arc::new(LeakyBucket::new(1e5).unwrap());

        for _ in 0..10 {
            let mut tasks = JoinSet::new();
            for _ in 0..2000 {
                let bucket = Arc::clone(&bucket);
                tasks.spawn(async move { bucket.acquire().await });
            }
            while let Some(result) = tasks.join_next().await {
                let admitted = result.unwrap();
                assert!(admitted.is_ok(), "{admitted:?}");
            }

            let log = bucket.admissions();
            assert!(log.windows(2).all(|pair| pair[0] <= pair[1]));
            assert_eq!(bucket.in_flight(), 0);
        }
    }
}
