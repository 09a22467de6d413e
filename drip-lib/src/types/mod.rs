#![allow(unreachable_pub)]

mod error;
mod stats;
mod target;

pub use error::ErrorKind;
pub use stats::{RunStats, TaskFailure};
pub use target::{DEFAULT_TARGET, INDEX_PLACEHOLDER, Target};

/// The drip `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
