//! `-v`/`-q` flags that move the log level up or down from `info`.
//!
//! - `-q` shows warnings and errors, `-qq` only errors
//! - `-v` shows debug output, including throttling decisions
//! - `-vv` shows trace output, including every admission

use std::fmt;

use log::{Level, LevelFilter};
use serde::Deserialize;

#[derive(clap::Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More output per occurrence
    ///
    /// By default, drip logs at info level. Passing `-v` one time enables
    /// debug logging (which shows each throttling back-off), `-vv` trace.
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    verbose: u8,

    /// Less output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: u8,
}

impl Verbosity {
    /// Get the log level.
    pub(crate) const fn log_level(self) -> Level {
        level_enum(self.verbosity())
    }

    /// Get the log level filter.
    pub(crate) fn log_level_filter(self) -> LevelFilter {
        self.log_level().to_level_filter()
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn verbosity(self) -> i8 {
        level_value(Level::Info) - (self.quiet as i8) + (self.verbose as i8)
    }
}

// Deserialize from a level name such as "warn", "warning", or "Debug"
impl<'de> Deserialize<'de> for Verbosity {
    #[allow(clippy::cast_sign_loss)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = match s.to_lowercase().as_str() {
            "error" => Level::Error,
            "warn" | "warning" => Level::Warn,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            level => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{level}`"
                )));
            }
        };

        let offset = level_value(level) - level_value(Level::Info);
        Ok(if offset >= 0 {
            Verbosity {
                verbose: offset as u8,
                quiet: 0,
            }
        } else {
            Verbosity {
                verbose: 0,
                quiet: offset.unsigned_abs(),
            }
        })
    }
}

const fn level_value(level: Level) -> i8 {
    match level {
        Level::Error => 0,
        Level::Warn => 1,
        Level::Info => 2,
        Level::Debug => 3,
        Level::Trace => 4,
    }
}

const fn level_enum(verbosity: i8) -> Level {
    match verbosity {
        i8::MIN..=0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        _ => Level::Trace,
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[clap(flatten)]
        verbose: Verbosity,
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_shift_level() {
        use clap::Parser;
        let level = |args: &[&str]| Cli::parse_from(args).verbose.log_level();

        assert_eq!(level(&["drip"]), Level::Info);
        assert_eq!(level(&["drip", "-v"]), Level::Debug);
        assert_eq!(level(&["drip", "-vvvv"]), Level::Trace);
        assert_eq!(level(&["drip", "-q"]), Level::Warn);
        assert_eq!(level(&["drip", "-qqqq"]), Level::Error);
    }

    #[test]
    fn test_deserialize_level_names() {
        #[derive(Deserialize)]
        struct File {
            verbose: Verbosity,
        }
        let parse = |s: &str| toml::from_str::<File>(s).map(|f| f.verbose.log_level());

        assert_eq!(parse(r#"verbose = "Warning""#).unwrap(), Level::Warn);
        assert_eq!(parse(r#"verbose = "debug""#).unwrap(), Level::Debug);
        assert_eq!(parse(r#"verbose = "info""#).unwrap(), Level::Info);
        assert!(parse(r#"verbose = "loud""#).is_err());
    }
}
