//! `drip` shapes outbound traffic on the client side.
//!
//! A [`Dispatcher`] launches one task per request. Every task passes a shared
//! [`throttle::Throttle`] before issuing its request, and the run ends with a
//! [`RunStats`] report of desired vs. achieved throughput:
//!
//! ```no_run
//! use std::sync::Arc;
//! use drip_lib::throttle::LeakyBucket;
//! use drip_lib::{Dispatcher, RequesterBuilder, Result, RunPlan, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let throttle = Arc::new(LeakyBucket::new(5.0)?);
//!   let requester = Arc::new(RequesterBuilder::default().requester()?);
//!   let dispatcher = Dispatcher::new(throttle, requester);
//!
//!   let plan = RunPlan::new(Target::new("http://localhost:8080/{}")?, 5, 2);
//!   let stats = dispatcher.run(&plan).await;
//!   println!("{:.2} requests/s", stats.achieved_qps());
//!   Ok(())
//! }
//! ```
//!
//! The throttles can also be used on their own to pace any async work, see
//! [`throttle::Permit`].
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
#![warn(missing_docs)]

mod dispatcher;
mod requester;
mod types;

pub mod clock;
pub mod throttle;

pub use crate::{
    clock::{Clock, TokioClock},
    dispatcher::{Dispatcher, RunPlan},
    requester::{
        DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpRequester, Requester, RequesterBuilder,
    },
    types::{DEFAULT_TARGET, ErrorKind, INDEX_PLACEHOLDER, Result, RunStats, TaskFailure, Target},
};
