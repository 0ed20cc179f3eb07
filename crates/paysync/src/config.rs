//! Suite configuration and credentials
//!
//! Settings come from a YAML file and are then overridden from the
//! environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PAYSYNC_BASE_URL` | `base_url` |
//! | `PAYSYNC_HEADLESS` | `browser.headless` |
//! | `PAYSYNC_CHROMIUM_PATH` | `browser.chromium_path` |
//!
//! Credentials are never stored in the file. Only the names of the
//! variables holding them are (`PAYSYNC_USER` / `PAYSYNC_PASSWORD` by
//! default). A `.env` file may supply them when the process environment
//! does not.

use crate::executor::{ExecutorConfig, MatchPolicy, DEFAULT_OVERLAY_SELECTOR};
use crate::locator::{Locator, Selector};
use crate::result::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default dotenv file consulted for credentials
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Parse a dotenv file without touching the process environment
pub fn read_env_file(path: &Path) -> SyncResult<HashMap<String, String>> {
    let invalid = |e: dotenvy::Error| SyncError::config(format!("{}: {e}", path.display()));
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter.collect::<Result<_, _>>().map_err(invalid),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(invalid(e)),
    }
}

/// Environment variable overriding the base URL
pub const ENV_BASE_URL: &str = "PAYSYNC_BASE_URL";
/// Environment variable overriding headless mode
pub const ENV_HEADLESS: &str = "PAYSYNC_HEADLESS";
/// Environment variable overriding the Chromium binary
pub const ENV_CHROMIUM_PATH: &str = "PAYSYNC_CHROMIUM_PATH";

/// Wait budgets, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Delay between two polls
    pub poll_interval_ms: u64,
    /// Readiness budget of one action
    pub action_ms: u64,
    /// Page-level waits
    pub page_ms: u64,
    /// Settling after a dropdown selection
    pub dropdown_settle_ms: u64,
    /// New transaction to be listed
    pub transaction_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            action_ms: 15_000,
            page_ms: 12_000,
            dropdown_settle_ms: 2_000,
            transaction_ms: 20_000,
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a window
    pub headless: bool,
    /// Chromium binary; discovered on `PATH` when unset
    pub chromium_path: Option<PathBuf>,
    /// Keep the Chromium sandbox enabled
    pub sandbox: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Capture a screenshot when a scenario fails
    pub screenshot_on_failure: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            sandbox: true,
            viewport_width: 1366,
            viewport_height: 900,
            screenshot_on_failure: true,
        }
    }
}

impl BrowserSettings {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the Chromium binary
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable the sandbox (needed in most containers)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set the viewport size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }
}

/// Names of the variables holding the credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSource {
    /// Variable holding the username
    pub user_var: String,
    /// Variable holding the password
    pub password_var: String,
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self {
            user_var: "PAYSYNC_USER".to_string(),
            password_var: "PAYSYNC_PASSWORD".to_string(),
        }
    }
}

/// Whole-suite configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Landing page of the application under test
    pub base_url: String,
    /// Wait budgets
    pub timeouts: TimeoutSettings,
    /// Loading overlay
    pub overlay: Selector,
    /// How dropdown queries are matched
    pub dropdown_policy: MatchPolicy,
    /// Browser launch settings
    pub browser: BrowserSettings,
    /// Where the credentials come from
    pub credentials: CredentialSource,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeouts: TimeoutSettings::default(),
            overlay: Selector::css(DEFAULT_OVERLAY_SELECTOR),
            dropdown_policy: MatchPolicy::Exact,
            browser: BrowserSettings::default(),
            credentials: CredentialSource::default(),
        }
    }
}

impl SuiteConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the browser settings
    #[must_use]
    pub fn with_browser(mut self, browser: BrowserSettings) -> Self {
        self.browser = browser;
        self
    }

    /// Set the timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TimeoutSettings) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Parse YAML and validate
    pub fn from_yaml(yaml: &str) -> SyncResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file and validate
    pub fn load(path: &Path) -> SyncResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Apply `PAYSYNC_*` overrides from the process environment
    pub fn apply_env(self) -> SyncResult<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(headless) = lookup(ENV_HEADLESS) {
            self.browser.headless = parse_bool(ENV_HEADLESS, &headless)?;
        }
        if let Some(path) = lookup(ENV_CHROMIUM_PATH) {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> SyncResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SyncError::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(SyncError::config("poll_interval_ms must be positive"));
        }
        if self.timeouts.action_ms < self.timeouts.poll_interval_ms {
            return Err(SyncError::config(
                "action_ms must not be shorter than poll_interval_ms",
            ));
        }
        Ok(())
    }

    /// Executor timings derived from this configuration
    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        let t = &self.timeouts;
        ExecutorConfig::new()
            .with_poll_interval(Duration::from_millis(t.poll_interval_ms))
            .with_action_timeout(Duration::from_millis(t.action_ms))
            .with_page_timeout(Duration::from_millis(t.page_ms))
            .with_dropdown_settle(Duration::from_millis(t.dropdown_settle_ms))
            .with_overlay(Locator::from_selector(self.overlay.clone()).named("loading overlay"))
    }

    /// Budget for a new transaction to show up
    #[must_use]
    pub const fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.transaction_ms)
    }
}

fn parse_bool(name: &str, value: &str) -> SyncResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SyncError::config(format!("{name}: expected a boolean, got '{other}'"))),
    }
}

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read the credentials from the process environment, falling back to
    /// variables parsed by [`read_env_file`]
    pub fn from_env_or(
        source: &CredentialSource,
        fallback: &HashMap<String, String>,
    ) -> SyncResult<Self> {
        Self::from_lookup(source, |name| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.get(name).cloned())
        })
    }

    /// Read the credentials from an arbitrary variable lookup
    pub fn from_lookup<F>(source: &CredentialSource, lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SyncError::config(format!("environment variable {name} is not set")))
        };
        Ok(Self::new(read(&source.user_var)?, read(&source.password_var)?))
    }

    /// Username
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
