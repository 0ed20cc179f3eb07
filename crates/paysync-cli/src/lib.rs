//! PaySync CLI library
//!
//! Command-line front end for running payment feature files against a
//! browser with synchronized actions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{CheckArgs, Cli, ColorArg, Commands, ConfigArgs, FormatArg, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, ProgressReporter};
pub use runner::{check_features, load_features, load_suite_config, write_reports, SuiteRunner};
