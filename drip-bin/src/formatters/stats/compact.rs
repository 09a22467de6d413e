use anyhow::Result;
use console::Style;
use drip_lib::RunStats;
use std::{
    fmt::{self, Display},
    sync::LazyLock,
    time::Duration,
};

use crate::formatters::color::{
    BOLD_GREEN, BOLD_PINK, BOLD_YELLOW, DIM, NORMAL, PINK, YELLOW, color,
};
use crate::options::OutputMode;

use super::StatsFormatter;

struct CompactRunStats<'a> {
    stats: &'a RunStats,
    mode: OutputMode,
}

impl CompactRunStats<'_> {
    /// Plain mode writes every part unstyled
    fn style(&self, style: &'static LazyLock<Style>) -> &'static Style {
        let style = if self.mode.is_plain() { &NORMAL } else { style };
        &**style
    }
}

impl Display for CompactRunStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats;
        let (normal, dim) = (self.style(&NORMAL), self.style(&DIM));
        let (green, pink, yellow) = (
            self.style(&BOLD_GREEN),
            self.style(&BOLD_PINK),
            self.style(&BOLD_YELLOW),
        );

        if !stats.failures.is_empty() {
            let failed = self.style(&PINK);
            let request = if stats.failures.len() == 1 {
                "request"
            } else {
                "requests"
            };
            color!(
                f,
                pink,
                "{} {request} failed. Find details below.\n\n",
                stats.failures.len()
            )?;
            for failure in &stats.failures {
                color!(f, failed, "[{}] {}\n", failure.index, failure.error)?;
            }
            writeln!(f)?;
        }

        color!(f, normal, "🚦 {} Total", stats.attempted)?;

        // show duration (in a human readable format), e.g. 4s 500ms
        #[allow(clippy::cast_possible_truncation)]
        let duration = Duration::from_millis(stats.duration.as_millis() as u64);
        color!(f, dim, " (in {})", humantime::format_duration(duration))?;

        color!(f, green, " ✅ {} OK", stats.completed)?;
        let failed = if stats.failed == 1 { "Failure" } else { "Failures" };
        if stats.timeouts > 0 {
            color!(
                f,
                pink,
                " 🚫 {} {} ({} timed out)",
                stats.failed,
                failed,
                stats.timeouts
            )?;
        } else {
            color!(f, pink, " 🚫 {} {}", stats.failed, failed)?;
        }
        if stats.cancelled > 0 {
            color!(f, yellow, " ⏹ {} Cancelled", stats.cancelled)?;
        }
        writeln!(f)?;

        color!(
            f,
            normal,
            "{} with desired rate {:.2}/s, achieved {:.2}/s",
            stats.algorithm,
            stats.desired_qps,
            stats.achieved_qps()
        )?;
        if let Some(median) = stats.median_request_time() {
            color!(f, dim, " (median request time {median:?})",)?;
        }

        if !stats.status_codes.is_empty() {
            let codes = self.style(&YELLOW);
            writeln!(f)?;
            let histogram = stats
                .status_codes
                .iter()
                .map(|(code, count)| format!("{code} × {count}"))
                .collect::<Vec<_>>()
                .join(", ");
            color!(f, codes, "Status codes: {}", histogram)?;
        }

        Ok(())
    }
}

pub(crate) struct Compact {
    mode: OutputMode,
}

impl Compact {
    pub(crate) const fn new(mode: OutputMode) -> Self {
        Self { mode }
    }
}

impl StatsFormatter for Compact {
    fn format(&self, stats: &RunStats) -> Result<String> {
        let compact = CompactRunStats {
            stats,
            mode: self.mode.clone(),
        };
        Ok(compact.to_string())
    }
}
