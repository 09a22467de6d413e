use anyhow::{Context, Result};
use drip_lib::RunStats;

use super::StatsFormatter;

pub(crate) struct Json;

impl Json {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl StatsFormatter for Json {
    /// Format stats as JSON object
    fn format(&self, stats: &RunStats) -> Result<String> {
        serde_json::to_string_pretty(stats).context("Cannot format stats as JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_lib::throttle::Algorithm;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_json_report() {
        let mut stats = RunStats::new(Algorithm::TokenBucket, 4.0, 8);
        for _ in 0..8 {
            stats.record_response(200, Duration::from_millis(5));
        }
        stats.finish(Duration::from_secs(2));

        let json = Json::new().format(&stats).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["algorithm"], "token");
        assert_eq!(value["desired_qps"], 4.0);
        assert_eq!(value["achieved_qps"], 4.0);
        assert_eq!(value["completed"], 8);
        assert_eq!(value["timeouts"], 0);
        assert_eq!(value["status_codes"]["200"], 8);
    }
}
