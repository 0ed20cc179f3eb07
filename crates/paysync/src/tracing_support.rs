//! Log subscriber setup.
//!
//! The library only emits `tracing` events; binaries and test suites call
//! [`init_tracing`] once to print them. `PAYSYNC_LOG` takes precedence over
//! `RUST_LOG`, and both over the configured level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive
pub const ENV_LOG: &str = "PAYSYNC_LOG";

/// Output format of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, one line per event
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter directive, e.g. `info` or `paysync=debug`
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogSettings {
    /// Level from a `-v`/`-q` count: quiet wins, then 0 = info, 1 = debug, more = trace
    #[must_use]
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            level: level.to_string(),
            format: LogFormat::Pretty,
        }
    }

    /// Switch to JSON lines
    #[must_use]
    pub const fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Filter from the environment, falling back to `level`
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        self.filter_with(|name| std::env::var(name).ok())
    }

    fn filter_with<F>(&self, lookup: F) -> EnvFilter
    where
        F: Fn(&str) -> Option<String>,
    {
        [ENV_LOG, "RUST_LOG"]
            .iter()
            .filter_map(|name| lookup(name))
            .find_map(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| {
                EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
            })
    }
}

/// Install the global subscriber
///
/// Returns `false` when a subscriber was already installed, so repeated
/// calls from tests are harmless.
pub fn init_tracing(settings: &LogSettings) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_target(false)
        .with_writer(std::io::stderr);
    match settings.format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}
