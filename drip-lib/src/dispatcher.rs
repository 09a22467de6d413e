//! Fan out a run of requests behind a shared throttle.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use http::StatusCode;
use log::{debug, info, warn};
use tokio::task::JoinSet;

use crate::clock::{Clock, TokioClock, elapsed_since};
use crate::requester::Requester;
use crate::throttle::{Permit, Throttle};
use crate::{ErrorKind, Result, RunStats, Target};

/// What a run should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Where requests are sent
    pub target: Target,
    /// Desired requests per second
    pub target_rate: u32,
    /// Number of seconds' worth of requests to issue at the desired rate
    pub iterations: u32,
}

impl RunPlan {
    /// Create a new plan
    #[must_use]
    pub const fn new(target: Target, target_rate: u32, iterations: u32) -> Self {
        Self {
            target,
            target_rate,
            iterations,
        }
    }

    /// Total number of requests issued by the run
    #[must_use]
    pub const fn request_count(&self) -> usize {
        self.target_rate as usize * self.iterations as usize
    }
}

/// Launches one task per request. Every task passes the shared throttle
/// before handing its request to the [`Requester`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    throttle: Arc<dyn Throttle>,
    requester: Arc<dyn Requester>,
    clock: Arc<dyn Clock>,
}

/// Outcome of a single request task
type Outcome = Result<(StatusCode, Duration)>;

impl Dispatcher {
    /// Create a dispatcher timed by the tokio clock
    #[must_use]
    pub fn new(throttle: Arc<dyn Throttle>, requester: Arc<dyn Requester>) -> Self {
        Self::with_clock(throttle, requester, Arc::new(TokioClock))
    }

    /// Create a dispatcher that measures durations with the given clock
    #[must_use]
    pub fn with_clock(
        throttle: Arc<dyn Throttle>,
        requester: Arc<dyn Requester>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            throttle,
            requester,
            clock,
        }
    }

    /// Run the plan to completion.
    ///
    /// Failed requests are recorded in the returned statistics; they never
    /// stop the run.
    pub async fn run(&self, plan: &RunPlan) -> RunStats {
        self.run_until(plan, std::future::pending()).await
    }

    /// Run the plan until it completes or `shutdown` resolves.
    ///
    /// On shutdown, every outstanding task is aborted and joined before the
    /// partial statistics are returned. Aborted tasks count as cancelled.
    pub async fn run_until<F>(&self, plan: &RunPlan, shutdown: F) -> RunStats
    where
        F: Future<Output = ()>,
    {
        let count = plan.request_count();
        let algorithm = self.throttle.algorithm();
        let mut stats = RunStats::new(algorithm, f64::from(plan.target_rate), count);

        info!(
            "Dispatching {count} requests to {} at {} requests/s ({algorithm})",
            plan.target, plan.target_rate
        );

        let target = Arc::new(plan.target.clone());
        let start = self.clock.now();

        let mut tasks = JoinSet::new();
        for index in 0..count {
            let throttle = Arc::clone(&self.throttle);
            let requester = Arc::clone(&self.requester);
            let clock = Arc::clone(&self.clock);
            let target = Arc::clone(&target);
            tasks.spawn(async move {
                let outcome =
                    AssertUnwindSafe(issue(&*throttle, &*requester, &*clock, &target, index))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(ErrorKind::TaskJoin(panic_message(&*panic))));
                (index, outcome)
            });
        }

        tokio::pin!(shutdown);
        let mut cancelled = false;
        loop {
            tokio::select! {
                () = &mut shutdown, if !cancelled => {
                    warn!("Shutdown requested, aborting {} outstanding requests", tasks.len());
                    tasks.abort_all();
                    cancelled = true;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((index, Ok((status, request_time))))) => {
                        debug!("Request {index} completed with {status} in {request_time:?}");
                        stats.record_response(status.as_u16(), request_time);
                    }
                    Some(Ok((index, Err(e)))) => {
                        warn!("Request {index} failed: {e}");
                        stats.record_failure(index, &e);
                    }
                    // Panics are caught inside the task, so only aborted
                    // tasks end up here
                    Some(Err(_)) => stats.record_cancelled(),
                }
            }
        }

        stats.finish(self.clock.now().saturating_duration_since(start));
        stats
    }
}

/// Pass the throttle, then issue one request and time it
async fn issue(
    throttle: &dyn Throttle,
    requester: &dyn Requester,
    clock: &dyn Clock,
    target: &Target,
    index: usize,
) -> Outcome {
    let _permit = Permit::acquire(throttle).await?;
    let url = target.url_for(index)?;

    let sent = clock.now();
    let status = requester.perform(&url).await?;
    Ok((status, elapsed_since(clock.now(), sent)?))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("task panicked"))
}
