//! PaySync: synchronized browser actions for end-to-end banking UI tests
//!
//! Single-page applications render asynchronously: elements appear late,
//! loading overlays cover them, and re-renders replace them under the
//! cursor. PaySync drives every interaction through an executor that waits
//! for readiness, performs the action, falls back to a script-level action
//! once, and reports exactly which condition was unmet when it gives up.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       PAYSYNC Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌─────────┐  │
//! │  │ Feature    │   │ Page       │   │ Sync       │   │ Page    │  │
//! │  │ (YAML)     │──►│ Objects    │──►│ Executor   │──►│ Driver  │  │
//! │  │ + Steps    │   │            │   │ + Waiter   │   │ (CDP)   │  │
//! │  └────────────┘   └────────────┘   └────────────┘   └─────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use paysync::{Locator, MockDriver, SyncExecutor};
//!
//! # async fn demo() -> paysync::SyncResult<()> {
//! let driver = MockDriver::new();
//! let exec = SyncExecutor::new(&driver);
//! exec.click(&Locator::css("button.pay").named("Pay")).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod config;
mod driver;
mod executor;
mod locator;
mod page_object;
mod result;
mod wait;

/// Page objects of the banking application
pub mod pages;

/// Feature files, step matching and the scenario runner
pub mod scenario;

/// Log subscriber setup
pub mod tracing_support;

/// Chromium sessions over CDP
#[cfg(feature = "browser")]
#[allow(clippy::significant_drop_tightening)]
pub mod browser;

pub use config::{
    read_env_file, BrowserSettings, CredentialSource, Credentials, SuiteConfig,
    TimeoutSettings, DEFAULT_ENV_FILE, ENV_BASE_URL, ENV_CHROMIUM_PATH, ENV_HEADLESS,
};
pub use driver::{
    DriverError, DriverResult, ElementHandle, ElementState, InteractionError, Key, MockDriver,
    MockEffect, MockElement, PageDriver,
};
pub use executor::{
    Action, ActionOutcome, ActionState, ExecutorConfig, LoadPolicy, MatchPolicy,
    SearchableDropdown, SettleReport, Strategy, SyncExecutor, DEFAULT_OVERLAY_SELECTOR,
};
pub use locator::{Locator, Selector};
pub use page_object::{wait_for_page, PageObject, UrlMatcher};
pub use result::{SyncError, SyncResult};
pub use wait::{Readiness, WaitCondition, Waiter, DEFAULT_POLL_INTERVAL_MS};

#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumLauncher};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::pages::{
        Amount, DashboardPage, LoginPage, PaymentDetails, PaymentsPage, TransactionsPage,
    };
    pub use super::scenario::{Feature, FeatureReport, ScenarioRunner, SessionProvider};
    pub use super::{
        Action, ActionOutcome, Credentials, Key, Locator, MockDriver, MockElement, PageDriver,
        PageObject, Selector, SuiteConfig, SyncError, SyncExecutor, SyncResult, WaitCondition,
    };
}
