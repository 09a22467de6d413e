pub(crate) mod color;
pub(crate) mod log;
pub(crate) mod stats;

use self::stats::StatsFormatter;
use crate::options::{OutputMode, StatsFormat};
use supports_color::Stream;

/// Detects whether a terminal supports color, and gives details about that
/// support. It takes into account the `NO_COLOR` environment variable.
fn supports_color() -> bool {
    supports_color::on(Stream::Stdout).is_some()
}

pub(crate) fn get_stats_formatter(
    format: &StatsFormat,
    mode: &OutputMode,
) -> Box<dyn StatsFormatter> {
    match format {
        StatsFormat::Compact => {
            let mode = if supports_color() {
                mode.clone()
            } else {
                OutputMode::Plain
            };
            Box::new(stats::Compact::new(mode))
        }
        StatsFormat::Json => Box::new(stats::Json::new()),
    }
}
