mod compact;
mod json;

pub(crate) use compact::Compact;
pub(crate) use json::Json;

use anyhow::{Context, Result};
use drip_lib::RunStats;

use crate::{formatters::get_stats_formatter, options::Config};

pub(crate) trait StatsFormatter {
    /// Format the statistics of a finished run
    fn format(&self, stats: &RunStats) -> Result<String>;
}

/// Write the run report to the configured output file, or stdout
pub(crate) fn output_statistics(stats: &RunStats, config: &Config) -> Result<()> {
    let formatter = get_stats_formatter(&config.format, &config.mode);
    let formatted = formatter.format(stats)?;

    if let Some(output) = &config.output {
        std::fs::write(output, formatted).context("Cannot write status output to file")?;
    } else {
        println!("{formatted}");
    }
    Ok(())
}
