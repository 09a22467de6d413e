use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use drip_lib::throttle::Algorithm;
use drip_lib::{DEFAULT_TARGET, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::{Display, EnumIter, EnumString, VariantNames};

pub(crate) const DRIP_CONFIG_FILE: &str = "drip.toml";

const DEFAULT_METHOD: &str = "get";
const DEFAULT_QPS: u32 = 1;
const DEFAULT_ITERATIONS: u32 = 10;

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const QPS_STR: &str = concatcp!(DEFAULT_QPS);
const ITERATIONS_STR: &str = concatcp!(DEFAULT_ITERATIONS);
const TIMEOUT_STR: &str = concatcp!(DEFAULT_TIMEOUT_SECS);
// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    DRIP_CONFIG_FILE,
);

/// The format to use for the final run report
#[derive(Debug, Deserialize, Default, Clone, Display, EnumIter, VariantNames, PartialEq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum StatsFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for StatsFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(StatsFormat::Compact),
            "json" => Ok(StatsFormat::Json),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

/// The different formatter modes
///
/// This decides over whether to use color or plain text for the output.
#[derive(
    Debug, Deserialize, Default, Clone, Display, EnumIter, EnumString, VariantNames, PartialEq,
)]
#[non_exhaustive]
pub(crate) enum OutputMode {
    /// Plain text output.
    ///
    /// Helpful for scripting or when you want to pipe the output to another
    /// program.
    #[serde(rename = "plain")]
    #[strum(serialize = "plain", ascii_case_insensitive)]
    Plain,

    /// Colorful output.
    ///
    /// This is the default output mode.
    #[serde(rename = "color")]
    #[strum(serialize = "color", ascii_case_insensitive)]
    #[default]
    Color,
}

impl OutputMode {
    /// Returns `true` if the response format is `Plain`
    pub(crate) const fn is_plain(&self) -> bool {
        matches!(self, OutputMode::Plain)
    }
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    qps: u32 = DEFAULT_QPS;
    iterations: u32 = DEFAULT_ITERATIONS;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    timeout: usize = DEFAULT_TIMEOUT_SECS;
    method: String = DEFAULT_METHOD.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace.
///
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
///
/// # Errors
///
/// This fails if the header does not contain a `:` character or
/// if the header name contains non-ASCII characters.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let parts: Vec<&str> = header.splitn(2, ':').collect();
    match parts.as_slice() {
        [name, value] => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        _ => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
///
/// This does NOT merge multiple headers into one.
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid_utf8 = || {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                "Header value contains invalid UTF-8",
            )
        };
        let header_str = value.to_str().ok_or_else(invalid_utf8)?;

        let (name, value) = parse_single_header(header_str)
            .map_err(|e| clap::Error::raw(clap::error::ErrorKind::InvalidValue, e.to_string()))?;
        let value = value.to_str().map_err(|_| invalid_utf8())?;
        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// drip fires HTTP requests at a target while holding them to a steady rate.
///
/// Requests pass a leaky bucket (smooths bursts into a steady drain) or a
/// token bucket (admits bursts up to a capacity, then refills at the rate).
/// The run ends with a report of the desired vs. the achieved rate.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct DripOptions {
    /// Request URL; `{}` is replaced by the index of each request
    #[arg(default_value = DEFAULT_TARGET)]
    pub(crate) url: String,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for drip
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Desired requests per second
    #[arg(
        short = 'r',
        long,
        alias = "queries-per-second-rate",
        default_value = &QPS_STR,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    #[serde(default = "qps")]
    pub(crate) qps: u32,

    /// Number of seconds' worth of requests to send at the desired rate.
    /// The run issues `qps * iterations` requests in total.
    #[arg(
        short,
        long,
        default_value = &ITERATIONS_STR,
        value_parser = clap::value_parser!(u32).range(1..),
        verbatim_doc_comment
    )]
    #[serde(default = "iterations")]
    pub(crate) iterations: u32,

    /// Throttling algorithm
    #[arg(
        short,
        long,
        default_value = "leaky",
        value_parser = PossibleValuesParser::new(["leaky", "token"]).try_map(|s| s.parse::<Algorithm>())
    )]
    #[serde(default)]
    pub(crate) algorithm: Algorithm,

    /// Token bucket capacity, i.e. the largest burst admitted at once.
    /// Defaults to the desired requests per second.
    #[arg(long, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) capacity: Option<f64>,

    /// Tokens consumed by each request (token bucket only).
    /// Defaults to 1.
    #[arg(long, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) cost: Option<f64>,

    /// How long token bucket waiters sleep between refill checks,
    /// e.g. `250ms`. Defaults to 1s.
    #[arg(long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) poll_interval: Option<Duration>,

    /// Number of threads to utilize.
    /// Defaults to number of cores available to the system
    #[arg(short = 'T', long)]
    #[serde(default)]
    pub(crate) threads: Option<usize>,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Proceed for server connections considered insecure (invalid TLS)
    #[arg(long)]
    #[serde(default)]
    pub(crate) insecure: bool,

    /// Set custom header for requests
    #[arg(
        short = 'H',
        long = "header",
        value_parser = HeaderParser,
        number_of_values = 1,
        value_name = "HEADER:VALUE",
        long_help = "Set custom header for requests

You can specify custom headers in the format 'Name: Value'. For example, 'Accept: text/html'.
This is the same format that other tools like curl or wget use.
Multiple headers can be specified by using the flag multiple times."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Request timeout in seconds from connect to response finished
    #[arg(short, long, default_value = &TIMEOUT_STR)]
    #[serde(default = "timeout")]
    pub(crate) timeout: usize,

    /// Request method
    // Using `-X` as a short param similar to curl
    #[arg(short = 'X', long, default_value = DEFAULT_METHOD)]
    #[serde(default = "method")]
    pub(crate) method: String,

    /// Output file of the run report
    #[arg(short, long, value_parser)]
    #[serde(default)]
    pub(crate) output: Option<PathBuf>,

    /// Set the output display mode. Determines how results are presented in the terminal
    #[arg(long, default_value = "color", value_parser = PossibleValuesParser::new(OutputMode::VARIANTS).try_map(|s| s.parse::<OutputMode>()))]
    #[serde(default)]
    pub(crate) mode: OutputMode,

    /// Output format of the run report
    #[arg(short, long, default_value = "compact", value_parser = PossibleValuesParser::new(StatsFormat::VARIANTS).try_map(|s| s.parse::<StatsFormat>()))]
    #[serde(default)]
    pub(crate) format: StatsFormat,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Adds the headers from `other` that `self` does not set already, so a
    /// header given on the command line wins over the same header in the file.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let self_map = self.header.iter().cloned().collect::<HashMap<_, _>>();
        let other_map = other.iter().cloned().collect::<HashMap<_, _>>();

        // Merge the two maps, with `self` taking precedence
        let merged_map: HashMap<_, _> = other_map.into_iter().chain(self_map).collect();

        // Convert the merged map back to a Vec of tuples
        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        // Read configuration file
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // Special handling for headers before fold_in!
        self.merge_headers(&toml.header);

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,

                // Keys with defaults to assign
                algorithm: Algorithm::default(),
                capacity: None,
                cost: None,
                format: StatsFormat::default(),
                insecure: false,
                iterations: DEFAULT_ITERATIONS,
                method: DEFAULT_METHOD,
                mode: OutputMode::Color,
                output: None,
                poll_interval: None,
                qps: DEFAULT_QPS,
                threads: None,
                timeout: DEFAULT_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        DripOptions::command().debug_assert();
    }

    #[test]
    fn test_parse_custom_headers() {
        assert_eq!(
            parse_single_header("accept:text/html").unwrap(),
            (
                HeaderName::from_static("accept"),
                HeaderValue::from_static("text/html")
            )
        );
    }

    #[test]
    fn test_parse_custom_header_multiple_colons() {
        assert_eq!(
            parse_single_header("key:x-test:check=this").unwrap(),
            (
                HeaderName::from_static("key"),
                HeaderValue::from_static("x-test:check=this")
            )
        );
    }

    #[test]
    fn test_parse_invalid_header() {
        assert!(parse_single_header("no colon here").is_err());
    }

    #[test]
    fn test_header_map_from_pairs() {
        let pairs = vec![("X-Run".to_string(), "7".to_string())];
        let map = HeaderMap::from_header_pairs(&pairs).unwrap();
        assert_eq!(map.get("x-run").unwrap(), "7");
    }

    #[test]
    fn test_defaults() {
        let opts = DripOptions::parse_from(["drip"]);
        assert_eq!(opts.url, DEFAULT_TARGET);
        assert_eq!(opts.config.qps, DEFAULT_QPS);
        assert_eq!(opts.config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(opts.config.algorithm, Algorithm::LeakyBucket);
        assert_eq!(opts.config.format, StatsFormat::Compact);
    }

    #[test]
    fn test_rate_alias_and_algorithm() {
        let opts = DripOptions::parse_from([
            "drip",
            "--queries-per-second-rate",
            "5",
            "-a",
            "token",
            "--poll-interval",
            "250ms",
            "http://example.com/{}",
        ]);
        assert_eq!(opts.url, "http://example.com/{}");
        assert_eq!(opts.config.qps, 5);
        assert_eq!(opts.config.algorithm, Algorithm::TokenBucket);
        assert_eq!(
            opts.config.poll_interval,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(DripOptions::try_parse_from(["drip", "--qps", "0"]).is_err());
        assert!(DripOptions::try_parse_from(["drip", "-a", "sliding"]).is_err());
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let mut cli = DripOptions::parse_from(["drip", "--qps", "3", "-H", "x-run: cli"]).config;
        let toml: Config = toml::from_str(
            r#"
            qps = 8
            iterations = 2
            algorithm = "token"
            capacity = 4.0
            poll_interval = "100ms"
            header = { "x-run" = "file", "x-env" = "ci" }
            "#,
        )
        .unwrap();

        cli.merge(toml);

        // Set on the command line, so the file is ignored
        assert_eq!(cli.qps, 3);
        // Defaults are replaced by the file
        assert_eq!(cli.iterations, 2);
        assert_eq!(cli.algorithm, Algorithm::TokenBucket);
        assert_eq!(cli.capacity, Some(4.0));
        assert_eq!(cli.poll_interval, Some(Duration::from_millis(100)));

        let headers: HashMap<_, _> = cli.header.into_iter().collect();
        assert_eq!(headers.get("x-run").map(String::as_str), Some("cli"));
        assert_eq!(headers.get("x-env").map(String::as_str), Some("ci"));
    }

    #[test]
    fn test_unknown_config_key() {
        let err = toml::from_str::<Config>("burst = 3").unwrap_err();
        assert!(err.to_string().contains("burst"));
    }
}
