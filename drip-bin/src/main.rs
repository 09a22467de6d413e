//! `drip` fires HTTP requests at a target while holding them to a steady
//! rate, then reports the rate it actually achieved.
//!
//! The drip binary is a wrapper around drip-lib, which provides the throttles
//! and the dispatcher.
//!
//! Send 10 requests per second for 10 seconds to a local service, with each
//! request index substituted into the path:
//! ```sh
//! drip --qps 10 'http://localhost:8080/{}'
//! ```
//!
//! Allow bursts of up to 20 requests with a token bucket:
//! ```sh
//! drip -a token --qps 10 --capacity 20 'http://localhost:8080/items/{}'
//! ```
//!
//! Print the report as JSON and show every throttling decision:
//! ```sh
//! drip -vv --format json https://example.com/
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, ErrorKind};
use std::path::PathBuf;

use anyhow::{Error, Result, bail};
use clap::{Parser, crate_version};
use formatters::log::init_logging;
use log::{error, warn};

mod client;
mod formatters;
mod options;
mod verbosity;

use crate::formatters::stats::output_statistics;
use crate::options::{Config, DRIP_CONFIG_FILE, DripOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<DripOptions> {
    let mut opts = DripOptions::parse();

    init_logging(opts.config.verbose, &opts.config.mode);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // If no config file was explicitly provided, we try to load the default
        // config file from the current directory if the file exits. This will
        // raise an error if the file is invalid, just like the explicit provided
        // config file.
        let default_config = PathBuf::from(DRIP_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and call drip entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e} (drip {})", crate_version!());
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = match opts.config.threads {
        Some(1) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?,
        Some(threads) => {
            // We define our own runtime instead of the `tokio::main` attribute
            // since we want to make the number of threads configurable
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?
        }
        None => tokio::runtime::Runtime::new()?,
    };

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Resolves on Ctrl-C. If the handler cannot be installed, the run is simply
/// not interruptible.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C, the run cannot be interrupted: {e}");
        std::future::pending::<()>().await;
    }
}

/// Run drip with the given options
async fn run(opts: &DripOptions) -> Result<i32> {
    let (dispatcher, plan) = match client::create(&opts.url, &opts.config) {
        Ok(created) => created,
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::ConfigFile as i32);
        }
    };

    let stats = dispatcher.run_until(&plan, shutdown_signal()).await;
    output_statistics(&stats, &opts.config)?;

    let exit_code = if stats.is_success() {
        ExitCode::Success
    } else {
        ExitCode::RequestFailure
    };
    Ok(exit_code as i32)
}
