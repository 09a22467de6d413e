use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::ErrorKind;
use crate::throttle::Algorithm;

/// A request task that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    /// Index of the request within the run
    pub index: usize,
    /// Rendered error
    pub error: String,
}

/// Record and report the outcome of a dispatcher run
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Limiter the run was shaped with
    pub algorithm: Algorithm,
    /// Configured ceiling in requests per second
    pub desired_qps: f64,
    /// Number of request tasks launched
    pub attempted: usize,
    /// Number of requests that got a response
    pub completed: usize,
    /// Number of requests that failed (transport error, clock anomaly, panic)
    pub failed: usize,
    /// Number of failed requests that timed out waiting for the target
    pub timeouts: usize,
    /// Number of requests aborted because the run was cancelled
    pub cancelled: usize,
    /// Wall-clock duration of the whole run
    pub duration: Duration,
    /// Status code counts of completed requests
    pub status_codes: BTreeMap<u16, usize>,
    /// Per-request time spent waiting for the target (throttle wait excluded)
    pub request_times: Vec<Duration>,
    /// Failures, ordered by request index once the run is finished
    pub failures: Vec<TaskFailure>,
}

impl RunStats {
    /// Create empty statistics for a run of `attempted` requests
    #[must_use]
    pub const fn new(algorithm: Algorithm, desired_qps: f64, attempted: usize) -> Self {
        Self {
            algorithm,
            desired_qps,
            attempted,
            completed: 0,
            failed: 0,
            timeouts: 0,
            cancelled: 0,
            duration: Duration::ZERO,
            status_codes: BTreeMap::new(),
            request_times: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Record a request that received a response
    pub fn record_response(&mut self, status_code: u16, request_time: Duration) {
        self.completed += 1;
        *self.status_codes.entry(status_code).or_insert(0) += 1;
        self.request_times.push(request_time);
    }

    /// Record a request that failed
    pub fn record_failure(&mut self, index: usize, error: &ErrorKind) {
        self.failed += 1;
        if error.is_timeout() {
            self.timeouts += 1;
        }
        self.failures.push(TaskFailure {
            index,
            error: error.to_string(),
        });
    }

    /// Record a request task that was aborted by cancellation
    pub const fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Close the books on the run
    pub fn finish(&mut self, duration: Duration) {
        self.duration = duration;
        self.failures.sort_by_key(|f| f.index);
    }

    /// Requests per second that actually completed over the run.
    ///
    /// This is `0.0` for a run that took no measurable time.
    #[must_use]
    pub fn achieved_qps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let qps = self.completed as f64 / secs;
            qps
        } else {
            0.0
        }
    }

    /// Whether every launched request completed
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.completed == self.attempted
    }

    /// Get median request time
    #[must_use]
    pub fn median_request_time(&self) -> Option<Duration> {
        if self.request_times.is_empty() {
            return None;
        }

        let mut times = self.request_times.clone();
        times.sort();
        let mid = times.len() / 2;

        if times.len().is_multiple_of(2) {
            Some((times[mid - 1] + times[mid]) / 2)
        } else {
            Some(times[mid])
        }
    }
}

impl Serialize for RunStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let median_request_time_ms = self.median_request_time().map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("RunStats", 12)?;
        s.serialize_field("algorithm", &self.algorithm)?;
        s.serialize_field("desired_qps", &self.desired_qps)?;
        s.serialize_field("achieved_qps", &self.achieved_qps())?;
        s.serialize_field("attempted", &self.attempted)?;
        s.serialize_field("completed", &self.completed)?;
        s.serialize_field("failed", &self.failed)?;
        s.serialize_field("timeouts", &self.timeouts)?;
        s.serialize_field("cancelled", &self.cancelled)?;
        s.serialize_field("duration_secs", &self.duration.as_secs_f64())?;
        s.serialize_field("median_request_time_ms", &median_request_time_ms)?;
        s.serialize_field("status_codes", &self.status_codes)?;
        s.serialize_field("failures", &self.failures)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_achieved_qps() {
        let mut stats = RunStats::new(Algorithm::LeakyBucket, 2.0, 4);
        assert!(stats.achieved_qps().abs() < f64::EPSILON);

        for _ in 0..4 {
            stats.record_response(200, Duration::from_millis(10));
        }
        stats.finish(Duration::from_secs(2));
        assert!((stats.achieved_qps() - 2.0).abs() < f64::EPSILON);
        assert!(stats.is_success());
    }

    #[test]
    fn test_partial_completion() {
        let mut stats = RunStats::new(Algorithm::TokenBucket, 1.0, 3);
        stats.record_response(503, Duration::from_millis(30));
        stats.record_failure(2, &ErrorKind::TaskJoin("panicked".into()));
        stats.record_failure(1, &ErrorKind::ClockAnomaly(Duration::from_millis(1)));
        stats.finish(Duration::from_secs(1));

        assert!(!stats.is_success());
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.timeouts, 0);
        assert_eq!(stats.status_codes.get(&503), Some(&1));
        let indices: Vec<_> = stats.failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_median_request_time() {
        let mut stats = RunStats::new(Algorithm::LeakyBucket, 1.0, 3);
        assert_eq!(stats.median_request_time(), None);
        stats.record_response(200, Duration::from_millis(300));
        stats.record_response(200, Duration::from_millis(100));
        assert_eq!(
            stats.median_request_time(),
            Some(Duration::from_millis(200))
        );
        stats.record_response(200, Duration::from_millis(150));
        assert_eq!(
            stats.median_request_time(),
            Some(Duration::from_millis(150))
        );
    }

    #[test]
    fn test_serialize() {
        let mut stats = RunStats::new(Algorithm::LeakyBucket, 5.0, 2);
        stats.record_response(200, Duration::from_millis(8));
        stats.record_cancelled();
        stats.finish(Duration::from_millis(500));

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["algorithm"], "leaky");
        assert_eq!(json["completed"], 1);
        assert_eq!(json["cancelled"], 1);
        assert_eq!(json["timeouts"], 0);
        assert_eq!(json["achieved_qps"], 2.0);
        assert_eq!(json["status_codes"]["200"], 1);
    }
}
