//! Wait Mechanisms
//!
//! Polling waits over a live [`PageDriver`].
//!
//! A [`WaitCondition`] is a pure predicate over observed page state. The
//! [`Waiter`] evaluates it, sleeps for the poll interval, and evaluates it
//! again until it holds or the timeout elapses. Locators are re-resolved on
//! every evaluation; no element handle survives from one poll to the next.
//!
//! Running out of time is an expected outcome here, so it is reported as
//! [`Readiness::TimedOut`] rather than an error. Only a closed session
//! aborts a wait early.

use crate::driver::{DriverResult, ElementState, PageDriver};
use crate::locator::Locator;
use crate::result::{SyncError, SyncResult};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default polling interval (250ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

// =============================================================================
// WAIT CONDITION
// =============================================================================

/// Observable page state a caller can wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// At least one matching element is attached to the DOM
    Present(Locator),
    /// At least one matching element is displayed
    Visible(Locator),
    /// At least one matching element is displayed and enabled
    Clickable(Locator),
    /// No matching element is displayed (absent counts as invisible)
    Invisible(Locator),
    /// A matching element's text contains the substring
    TextContains {
        /// Element to read
        locator: Locator,
        /// Expected substring
        needle: String,
    },
    /// A matching element's trimmed text equals the given text
    ExactText {
        /// Element to read
        locator: Locator,
        /// Expected text
        text: String,
    },
    /// The current URL contains the substring
    UrlContains(String),
    /// `document.readyState` is `complete`
    DocumentReady,
    /// A script expression evaluates to a truthy value
    Script {
        /// JavaScript expression
        script: String,
        /// Readable description for failure messages
        description: String,
    },
}

/// Keep `Ok` values, turn non-fatal errors into `None`
fn tolerate<T>(result: DriverResult<T>) -> DriverResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            trace!(error = %err, "ignoring transient driver error");
            Ok(None)
        }
    }
}

fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

impl WaitCondition {
    /// Wait for the element to be attached
    #[must_use]
    pub const fn present(locator: Locator) -> Self {
        Self::Present(locator)
    }

    /// Wait for the element to be displayed
    #[must_use]
    pub const fn visible(locator: Locator) -> Self {
        Self::Visible(locator)
    }

    /// Wait for the element to be displayed and enabled
    #[must_use]
    pub const fn clickable(locator: Locator) -> Self {
        Self::Clickable(locator)
    }

    /// Wait for the element to be hidden or gone
    #[must_use]
    pub const fn invisible(locator: Locator) -> Self {
        Self::Invisible(locator)
    }

    /// Wait for the element's text to contain `needle`
    #[must_use]
    pub fn text_contains(locator: Locator, needle: impl Into<String>) -> Self {
        Self::TextContains {
            locator,
            needle: needle.into(),
        }
    }

    /// Wait for the element's text to be exactly `text`
    #[must_use]
    pub fn exact_text(locator: Locator, text: impl Into<String>) -> Self {
        Self::ExactText {
            locator,
            text: text.into(),
        }
    }

    /// Wait for the URL to contain `fragment`
    #[must_use]
    pub fn url_contains(fragment: impl Into<String>) -> Self {
        Self::UrlContains(fragment.into())
    }

    /// Wait for a custom DOM predicate
    #[must_use]
    pub fn script(script: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Script {
            script: script.into(),
            description: description.into(),
        }
    }

    /// What the condition expects, phrased positively
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Present(l) => format!("element '{l}' present"),
            Self::Visible(l) => format!("element '{l}' visible"),
            Self::Clickable(l) => format!("element '{l}' clickable"),
            Self::Invisible(l) => format!("element '{l}' invisible"),
            Self::TextContains { locator, needle } => {
                format!("text of '{locator}' contains '{needle}'")
            }
            Self::ExactText { locator, text } => format!("'{locator}' with text '{text}'"),
            Self::UrlContains(fragment) => format!("URL contains '{fragment}'"),
            Self::DocumentReady => "document load-complete".to_string(),
            Self::Script { description, .. } => description.clone(),
        }
    }

    /// What did not hold, used in timeout messages
    #[must_use]
    pub fn unmet_description(&self) -> String {
        match self {
            Self::Present(l) => format!("element '{l}' is not present"),
            Self::Visible(l) => format!("element '{l}' is not visible"),
            Self::Clickable(l) => format!("element '{l}' is not clickable"),
            Self::Invisible(l) => format!("element '{l}' is still visible"),
            Self::TextContains { locator, needle } => {
                format!("text of '{locator}' does not contain '{needle}'")
            }
            Self::ExactText { locator, text } => {
                format!("no '{locator}' with text exactly '{text}'")
            }
            Self::UrlContains(fragment) => format!("URL does not contain '{fragment}'"),
            Self::DocumentReady => "document is not load-complete".to_string(),
            Self::Script { description, .. } => format!("{description} does not hold"),
        }
    }

    /// Evaluate the condition once against the current page
    ///
    /// Transient failures while inspecting individual elements (a node
    /// detached mid-check) count as "not met". Only a closed session is
    /// returned as an error.
    pub async fn check<D: PageDriver + ?Sized>(&self, driver: &D) -> DriverResult<bool> {
        match self {
            Self::Present(locator) => Ok(!driver.find_all(locator.selector()).await?.is_empty()),
            Self::Visible(locator) => {
                Self::any_state(driver, locator, |s| s.displayed).await
            }
            Self::Clickable(locator) => {
                Self::any_state(driver, locator, ElementState::is_clickable).await
            }
            Self::Invisible(locator) => {
                Ok(!Self::any_state(driver, locator, |s| s.displayed).await?)
            }
            Self::TextContains { locator, needle } => {
                Self::any_text(driver, locator, |t| t.contains(needle.as_str())).await
            }
            Self::ExactText { locator, text } => {
                Self::any_text(driver, locator, |t| t.trim() == text.trim()).await
            }
            Self::UrlContains(fragment) => Ok(tolerate(driver.current_url().await)?
                .is_some_and(|url| url.contains(fragment.as_str()))),
            Self::DocumentReady => {
                Ok(tolerate(driver.ready_state().await)?.is_some_and(|s| s == "complete"))
            }
            Self::Script { script, .. } => {
                Ok(tolerate(driver.evaluate(script).await)?.is_some_and(|v| truthy(&v)))
            }
        }
    }

    async fn any_state<D, F>(driver: &D, locator: &Locator, pred: F) -> DriverResult<bool>
    where
        D: PageDriver + ?Sized,
        F: Fn(&ElementState) -> bool + Send,
    {
        let Some(elements) = tolerate(driver.find_all(locator.selector()).await)? else {
            return Ok(false);
        };
        for element in &elements {
            if let Some(state) = tolerate(driver.element_state(element).await)? {
                if pred(&state) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn any_text<D, F>(driver: &D, locator: &Locator, pred: F) -> DriverResult<bool>
    where
        D: PageDriver + ?Sized,
        F: Fn(&str) -> bool + Send,
    {
        let Some(elements) = tolerate(driver.find_all(locator.selector()).await)? else {
            return Ok(false);
        };
        for element in &elements {
            if let Some(text) = tolerate(driver.text(element).await)? {
                if pred(&text) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// READINESS
// =============================================================================

/// Binary outcome of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The condition held
    Ready {
        /// Time until the condition held
        elapsed: Duration,
        /// Number of evaluations
        polls: u32,
    },
    /// The timeout elapsed first
    TimedOut {
        /// Description of the unmet condition
        unmet: String,
        /// Time spent waiting
        elapsed: Duration,
        /// URL observed when giving up
        url: Option<String>,
        /// Last transient driver error seen while polling
        last_error: Option<String>,
    },
}

impl Readiness {
    /// Whether the condition held
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Time spent waiting
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed, .. } | Self::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    /// Convert a timeout into [`SyncError::Timeout`]
    pub fn into_result(self) -> SyncResult<Duration> {
        match self {
            Self::Ready { elapsed, .. } => Ok(elapsed),
            Self::TimedOut {
                unmet,
                elapsed,
                url,
                ..
            } => Err(SyncError::Timeout {
                condition: unmet,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                url,
            }),
        }
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Polls conditions against one driver
#[derive(Debug)]
pub struct Waiter<'a, D: ?Sized> {
    driver: &'a D,
    poll_interval: Duration,
}

impl<'a, D: PageDriver + ?Sized> Waiter<'a, D> {
    /// Create a waiter with the given poll interval
    #[must_use]
    pub const fn new(driver: &'a D, poll_interval: Duration) -> Self {
        Self {
            driver,
            poll_interval,
        }
    }

    /// Poll until `condition` holds or `timeout` elapses
    ///
    /// The condition is evaluated once immediately and then every poll
    /// interval. The last evaluation happens at the deadline, so a timeout
    /// is never reported before `timeout` has elapsed.
    pub async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> SyncResult<Readiness> {
        let start = Instant::now();
        let mut polls = 0u32;
        let mut last_error = None;

        loop {
            polls += 1;
            match condition.check(self.driver).await {
                Ok(true) => {
                    let elapsed = start.elapsed();
                    debug!(condition = %condition, polls, elapsed_ms = elapsed.as_millis() as u64, "condition met");
                    return Ok(Readiness::Ready { elapsed, polls });
                }
                Ok(false) => {}
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => last_error = Some(err.to_string()),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                let url = self.driver.current_url().await.ok();
                debug!(condition = %condition, polls, elapsed_ms = elapsed.as_millis() as u64, "condition timed out");
                return Ok(Readiness::TimedOut {
                    unmet: condition.unmet_description(),
                    elapsed,
                    url,
                    last_error,
                });
            }
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Like [`Waiter::wait_until`], converting a timeout into an error
    pub async fn require(&self, condition: &WaitCondition, timeout: Duration) -> SyncResult<Duration> {
        self.wait_until(condition, timeout).await?.into_result()
    }
}
