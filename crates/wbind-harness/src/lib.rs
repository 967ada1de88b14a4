#![forbid(unsafe_code)]

//! Command-line harness for wbind: replays edit scripts against resource
//! payloads and round-trips documents through observable graphs.

pub mod cli;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod replay;
pub mod script;
pub mod util;

pub use cli::{Cli, Commands, run, run_from_env};
pub use error::{HarnessError, Result};
