//! Synchronized Action Executor
//!
//! Every interaction with the page goes through [`SyncExecutor`]:
//!
//! ```text
//! Idle ──► AwaitingReady ──► TimedOut
//!               │
//!               ▼
//!             Ready ──► Executing ──► Succeeded
//!                           │
//!                           ▼
//!                      ActionFailed ──► FallbackExecuting ──► Succeeded
//!                                               │
//!                                               ▼
//!                                          FinalFailure
//! ```
//!
//! The executor waits for the state the action needs, re-resolves the
//! element, runs the native action, and on an interaction failure retries
//! exactly once through the scripting bridge. Wait timeouts are never
//! retried.

use crate::driver::{DriverError, ElementHandle, InteractionError, Key, PageDriver};
use crate::locator::Locator;
use crate::result::{SyncError, SyncResult};
use crate::wait::{Readiness, WaitCondition, Waiter, DEFAULT_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default overlay shown by the application while it is busy
pub const DEFAULT_OVERLAY_SELECTOR: &str = "div.loading_screen";

// =============================================================================
// CONFIG
// =============================================================================

/// Timing and overlay settings for one executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Delay between two evaluations of a wait condition
    pub poll_interval: Duration,
    /// Readiness budget for a single action
    pub action_timeout: Duration,
    /// Budget for page-level waits (settling, navigation)
    pub page_timeout: Duration,
    /// Settling budget after confirming a dropdown selection
    pub dropdown_settle: Duration,
    /// Loading overlay that must be gone before the page counts as settled
    pub overlay: Locator,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            action_timeout: Duration::from_secs(15),
            page_timeout: Duration::from_secs(12),
            dropdown_settle: Duration::from_secs(2),
            overlay: Locator::css(DEFAULT_OVERLAY_SELECTOR).named("loading overlay"),
        }
    }
}

impl ExecutorConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set action timeout
    #[must_use]
    pub const fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Set page timeout
    #[must_use]
    pub const fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Set dropdown settle timeout
    #[must_use]
    pub const fn with_dropdown_settle(mut self, timeout: Duration) -> Self {
        self.dropdown_settle = timeout;
        self
    }

    /// Set overlay locator
    #[must_use]
    pub fn with_overlay(mut self, overlay: Locator) -> Self {
        self.overlay = overlay;
        self
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// An interaction with one element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Click the element
    Click,
    /// Replace the element's value
    Fill(String),
    /// Type at the caret, keeping the current value
    Type(String),
    /// Press a key on the element
    Press(Key),
    /// Read the element's text
    Read,
}

impl Action {
    /// Condition that must hold before the action runs
    #[must_use]
    pub fn readiness(&self, locator: &Locator) -> WaitCondition {
        match self {
            Self::Click => WaitCondition::clickable(locator.clone()),
            _ => WaitCondition::visible(locator.clone()),
        }
    }

    /// Readable description; typed text is left out so secrets stay out of logs
    #[must_use]
    pub fn describe(&self, locator: &Locator) -> String {
        match self {
            Self::Click => format!("click on '{locator}'"),
            Self::Fill(_) => format!("fill '{locator}'"),
            Self::Type(_) => format!("type into '{locator}'"),
            Self::Press(key) => format!("press {key} on '{locator}'"),
            Self::Read => format!("read '{locator}'"),
        }
    }

    /// Whether the action can start asynchronous UI work
    #[must_use]
    pub const fn triggers_ui_work(&self) -> bool {
        matches!(self, Self::Click | Self::Press(Key::Enter))
    }
}

/// Per-action state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    /// Nothing happened yet
    Idle,
    /// Waiting for the readiness condition
    AwaitingReady,
    /// Readiness condition held
    Ready,
    /// Readiness condition did not hold in time
    TimedOut,
    /// Native action in flight
    Executing,
    /// Native action failed with an interaction error
    ActionFailed,
    /// Script fallback in flight
    FallbackExecuting,
    /// Action done
    Succeeded,
    /// Native action and fallback both failed
    FinalFailure,
}

impl ActionState {
    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TimedOut | Self::Succeeded | Self::FinalFailure)
    }
}

/// How an action finally went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Native driver input
    Native,
    /// Event dispatch through the scripting bridge
    Script,
}

/// Result of [`SyncExecutor::perform`]
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action went through
    Succeeded {
        /// Path that succeeded
        strategy: Strategy,
        /// Text read, for [`Action::Read`]
        value: Option<String>,
        /// States visited
        trail: Vec<ActionState>,
    },
    /// The element never reached the required state
    TimedOut {
        /// Readiness that timed out
        readiness: Readiness,
        /// States visited
        trail: Vec<ActionState>,
    },
    /// Native action and its single fallback both failed
    FinalFailure {
        /// Description of the action
        action: String,
        /// Failure of the native attempt
        primary: InteractionError,
        /// Failure of the fallback
        fallback: InteractionError,
        /// States visited
        trail: Vec<ActionState>,
    },
}

impl ActionOutcome {
    /// States visited, ending in a terminal state
    #[must_use]
    pub fn trail(&self) -> &[ActionState] {
        match self {
            Self::Succeeded { trail, .. }
            | Self::TimedOut { trail, .. }
            | Self::FinalFailure { trail, .. } => trail,
        }
    }

    /// Whether the action went through
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Convert into the value read, or the terminal error
    pub fn into_result(self) -> SyncResult<Option<String>> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::TimedOut { readiness, .. } => readiness.into_result().map(|_| None),
            Self::FinalFailure {
                action,
                primary,
                fallback,
                ..
            } => Err(SyncError::FinalFailure {
                action,
                primary,
                fallback,
            }),
        }
    }
}

/// Trail bookkeeping with a debug event per transition
#[derive(Debug)]
struct Trail {
    action: String,
    states: Vec<ActionState>,
}

impl Trail {
    fn new(action: String) -> Self {
        Self {
            action,
            states: vec![ActionState::Idle],
        }
    }

    fn enter(&mut self, state: ActionState) {
        let from = self.states.last().copied().unwrap_or(ActionState::Idle);
        debug!(action = %self.action, ?from, to = ?state, "action transition");
        self.states.push(state);
    }
}

// =============================================================================
// SETTLING
// =============================================================================

/// How a document-ready timeout in [`SyncExecutor::settle`] is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadPolicy {
    /// Propagate as [`SyncError::Timeout`]
    #[default]
    Required,
    /// Log and continue
    BestEffort,
}

/// What [`SyncExecutor::settle`] observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleReport {
    /// Wait for the overlay to disappear
    pub overlay: Readiness,
    /// Wait for `document.readyState == "complete"`
    pub document: Readiness,
}

impl SettleReport {
    /// Overlay gone and document complete
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.overlay.is_ready() && self.document.is_ready()
    }
}

// =============================================================================
// DROPDOWN
// =============================================================================

/// How the typed query is matched against the dropdown's options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Wait for an option whose text equals the query, then confirm and
    /// verify the displayed value
    #[default]
    Exact,
    /// Confirm whatever the widget highlights first
    FirstResult,
}

/// A combo box with a search input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchableDropdown {
    /// Element that opens the dropdown
    pub control: Locator,
    /// Search input revealed by the control
    pub input: Locator,
    /// Options rendered for the current query
    pub options: Locator,
    /// Element showing the selected value, if the widget has one
    pub selected: Option<Locator>,
    /// Option matching policy
    pub policy: MatchPolicy,
}

impl SearchableDropdown {
    /// Create a dropdown with the default exact-match policy
    #[must_use]
    pub const fn new(control: Locator, input: Locator, options: Locator) -> Self {
        Self {
            control,
            input,
            options,
            selected: None,
            policy: MatchPolicy::Exact,
        }
    }

    /// Element showing the selected value
    #[must_use]
    pub fn with_selected(mut self, selected: Locator) -> Self {
        self.selected = Some(selected);
        self
    }

    /// Set the match policy
    #[must_use]
    pub const fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Runs actions against one borrowed browser session
#[derive(Debug)]
pub struct SyncExecutor<'a, D: ?Sized> {
    driver: &'a D,
    config: ExecutorConfig,
}

impl<'a, D: PageDriver + ?Sized> SyncExecutor<'a, D> {
    /// Create an executor with default timings
    #[must_use]
    pub fn new(driver: &'a D) -> Self {
        Self::with_config(driver, ExecutorConfig::default())
    }

    /// Create an executor with the given timings
    #[must_use]
    pub const fn with_config(driver: &'a D, config: ExecutorConfig) -> Self {
        Self { driver, config }
    }

    /// The underlying driver
    #[must_use]
    pub const fn driver(&self) -> &'a D {
        self.driver
    }

    /// Timing settings
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn waiter(&self) -> Waiter<'a, D> {
        Waiter::new(self.driver, self.config.poll_interval)
    }

    /// Poll until `condition` holds or `timeout` elapses
    ///
    /// A timeout is a [`Readiness::TimedOut`] value. The call only fails
    /// when the session is gone.
    pub async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> SyncResult<Readiness> {
        self.waiter().wait_until(condition, timeout).await
    }

    /// Wait with the action timeout and turn a timeout into an error
    pub async fn require(&self, condition: &WaitCondition) -> SyncResult<()> {
        self.require_within(condition, self.config.action_timeout).await
    }

    /// Wait with an explicit timeout and turn a timeout into an error
    pub async fn require_within(&self, condition: &WaitCondition, timeout: Duration) -> SyncResult<()> {
        self.waiter().require(condition, timeout).await.map(|_| ())
    }

    /// Current URL, if the driver can report it
    pub async fn current_url(&self) -> Option<String> {
        self.driver.current_url().await.ok()
    }

    /// Navigate and wait for the document to finish loading
    pub async fn open(&self, url: &str) -> SyncResult<()> {
        info!(url, "navigating");
        self.driver.navigate(url).await?;
        self.require_within(&WaitCondition::DocumentReady, self.config.page_timeout)
            .await
    }

    /// Wait for the element, act on it, fall back once through the
    /// scripting bridge on an interaction failure
    pub async fn perform(
        &self,
        locator: &Locator,
        action: &Action,
        timeout: Duration,
    ) -> SyncResult<ActionOutcome> {
        let description = action.describe(locator);
        let mut trail = Trail::new(description.clone());

        trail.enter(ActionState::AwaitingReady);
        let readiness = self.wait_until(&action.readiness(locator), timeout).await?;
        if !readiness.is_ready() {
            trail.enter(ActionState::TimedOut);
            return Ok(ActionOutcome::TimedOut {
                readiness,
                trail: trail.states,
            });
        }
        trail.enter(ActionState::Ready);

        trail.enter(ActionState::Executing);
        let primary = match self.execute_native(locator, action).await {
            Ok(value) => {
                trail.enter(ActionState::Succeeded);
                return Ok(ActionOutcome::Succeeded {
                    strategy: Strategy::Native,
                    value,
                    trail: trail.states,
                });
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => err.into_interaction(),
        };
        trail.enter(ActionState::ActionFailed);
        warn!(action = %description, error = %primary, "native action failed, trying script fallback");

        trail.enter(ActionState::FallbackExecuting);
        match self.execute_fallback(locator, action).await {
            Ok(value) => {
                trail.enter(ActionState::Succeeded);
                Ok(ActionOutcome::Succeeded {
                    strategy: Strategy::Script,
                    value,
                    trail: trail.states,
                })
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                trail.enter(ActionState::FinalFailure);
                Ok(ActionOutcome::FinalFailure {
                    action: description,
                    primary,
                    fallback: err.into_interaction(),
                    trail: trail.states,
                })
            }
        }
    }

    /// First element that currently satisfies the action's requirement
    async fn resolve_ready(
        &self,
        locator: &Locator,
        action: &Action,
    ) -> Result<ElementHandle, DriverError> {
        let click = matches!(action, Action::Click);
        for element in self.driver.find_all(locator.selector()).await? {
            match self.driver.element_state(&element).await {
                Ok(state) if (click && state.is_clickable()) || (!click && state.displayed) => {
                    return Ok(element);
                }
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(_) => {}
            }
        }
        Err(InteractionError::Stale.into())
    }

    /// First displayed element, else the first attached one
    async fn resolve_any(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let elements = self.driver.find_all(locator.selector()).await?;
        for element in &elements {
            match self.driver.element_state(element).await {
                Ok(state) if state.displayed => return Ok(element.clone()),
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(_) => {}
            }
        }
        elements
            .into_iter()
            .next()
            .ok_or_else(|| InteractionError::Stale.into())
    }

    async fn execute_native(
        &self,
        locator: &Locator,
        action: &Action,
    ) -> Result<Option<String>, DriverError> {
        let element = self.resolve_ready(locator, action).await?;
        match action {
            Action::Click => {
                self.driver.scroll_into_view(&element).await?;
                self.driver.click(&element).await?;
            }
            Action::Fill(text) => {
                self.driver.clear(&element).await?;
                self.driver.type_text(&element, text).await?;
            }
            Action::Type(text) => self.driver.type_text(&element, text).await?,
            Action::Press(key) => self.driver.press_key(&element, *key).await?,
            Action::Read => return self.driver.text(&element).await.map(Some),
        }
        Ok(None)
    }

    async fn execute_fallback(
        &self,
        locator: &Locator,
        action: &Action,
    ) -> Result<Option<String>, DriverError> {
        let element = self.resolve_any(locator).await?;
        match action {
            Action::Click => self.driver.dispatch_click(&element).await?,
            Action::Fill(text) | Action::Type(text) => {
                self.driver.dispatch_value(&element, text).await?;
            }
            Action::Press(key) => self.driver.dispatch_key(&element, *key).await?,
            Action::Read => return self.driver.text_content(&element).await.map(Some),
        }
        Ok(None)
    }

    /// Perform with the action timeout; settle afterwards when the action
    /// can start UI work
    async fn act(&self, locator: &Locator, action: Action) -> SyncResult<Option<String>> {
        let value = self
            .perform(locator, &action, self.config.action_timeout)
            .await?
            .into_result()?;
        if action.triggers_ui_work() {
            self.settle(self.config.page_timeout, LoadPolicy::BestEffort)
                .await?;
        }
        Ok(value)
    }

    /// Click, then settle
    pub async fn click(&self, locator: &Locator) -> SyncResult<()> {
        self.act(locator, Action::Click).await.map(|_| ())
    }

    /// Clear and type
    pub async fn fill(&self, locator: &Locator, text: &str) -> SyncResult<()> {
        self.act(locator, Action::Fill(text.to_string()))
            .await
            .map(|_| ())
    }

    /// Type without clearing
    pub async fn type_text(&self, locator: &Locator, text: &str) -> SyncResult<()> {
        self.act(locator, Action::Type(text.to_string()))
            .await
            .map(|_| ())
    }

    /// Press a key; settles after Enter
    pub async fn press(&self, locator: &Locator, key: Key) -> SyncResult<()> {
        self.act(locator, Action::Press(key)).await.map(|_| ())
    }

    /// Read the text of a visible element
    pub async fn read_text(&self, locator: &Locator) -> SyncResult<String> {
        Ok(self.act(locator, Action::Read).await?.unwrap_or_default())
    }

    /// Whether the element becomes visible within `timeout`
    pub async fn is_visible_within(&self, locator: &Locator, timeout: Duration) -> SyncResult<bool> {
        Ok(self
            .wait_until(&WaitCondition::visible(locator.clone()), timeout)
            .await?
            .is_ready())
    }

    /// Wait for the overlay to go away and the document to be complete
    ///
    /// Both waits share one `timeout`. An overlay that outlives it is logged
    /// and reported in the [`SettleReport`] but never fails the call. A
    /// document that is not complete in time fails the call under
    /// [`LoadPolicy::Required`].
    pub async fn settle(&self, timeout: Duration, policy: LoadPolicy) -> SyncResult<SettleReport> {
        let deadline = Instant::now() + timeout;
        let overlay = self
            .wait_until(&WaitCondition::invisible(self.config.overlay.clone()), timeout)
            .await?;
        if let Readiness::TimedOut { unmet, url, .. } = &overlay {
            warn!(condition = %unmet, url = url.as_deref().unwrap_or("unknown"), "overlay did not disappear, continuing");
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let document = self
            .wait_until(&WaitCondition::DocumentReady, remaining)
            .await?;
        if let Err(err) = document.clone().into_result() {
            if policy == LoadPolicy::Required {
                return Err(err);
            }
            warn!(error = %err, "document not load-complete, continuing");
        }

        Ok(SettleReport { overlay, document })
    }

    /// Open a searchable dropdown, type `query` and confirm with Enter
    ///
    /// Under [`MatchPolicy::Exact`] the dropdown needs a selected-value
    /// locator, and the call only succeeds once that element shows exactly
    /// `query`. A widget that confirms a different highlighted option fails.
    pub async fn select_from_searchable_dropdown(
        &self,
        dropdown: &SearchableDropdown,
        query: &str,
    ) -> SyncResult<()> {
        info!(dropdown = %dropdown.control, query, policy = ?dropdown.policy, "selecting from dropdown");
        let verify = match (dropdown.policy, &dropdown.selected) {
            (MatchPolicy::Exact, Some(selected)) => {
                Some(WaitCondition::exact_text(selected.clone(), query))
            }
            (MatchPolicy::Exact, None) => {
                return Err(SyncError::config(format!(
                    "exact selection on '{}' needs a selected-value locator",
                    dropdown.control
                )));
            }
            (MatchPolicy::FirstResult, _) => None,
        };
        self.act(&dropdown.control, Action::Click).await?;
        self.act(&dropdown.input, Action::Press(Key::SelectAll)).await?;
        self.act(&dropdown.input, Action::Type(query.to_string()))
            .await?;

        if dropdown.policy == MatchPolicy::Exact {
            self.require(&WaitCondition::exact_text(dropdown.options.clone(), query))
                .await?;
        }

        self.perform(&dropdown.input, &Action::Press(Key::Enter), self.config.action_timeout)
            .await?
            .into_result()?;
        self.settle(self.config.dropdown_settle, LoadPolicy::BestEffort)
            .await?;

        if let Some(verify) = verify {
            self.require(&verify).await?;
        }
        Ok(())
    }

    /// Capture a PNG screenshot, if the driver supports it
    pub async fn screenshot(&self) -> SyncResult<Vec<u8>> {
        Ok(self.driver.screenshot().await?)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Script => write!(f, "script"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockEffect, MockElement};
    use crate::locator::Selector;

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig::default()
            .with_action_timeout(Duration::from_secs(2))
            .with_page_timeout(Duration::from_secs(2))
    }

    mod action_tests {
        use super::*;

        #[test]
        fn test_readiness_per_action() {
            let loc = Locator::css("#x");
            assert_eq!(Action::Click.readiness(&loc), WaitCondition::clickable(loc.clone()));
            assert_eq!(
                Action::Fill("a".into()).readiness(&loc),
                WaitCondition::visible(loc.clone())
            );
            assert_eq!(Action::Read.readiness(&loc), WaitCondition::visible(loc));
        }

        #[test]
        fn test_describe_hides_typed_text() {
            let loc = Locator::css("#password").named("Password");
            let description = Action::Fill("hunter2".into()).describe(&loc);
            assert_eq!(description, "fill 'Password'");
            assert!(!description.contains("hunter2"));
        }

        #[test]
        fn test_terminal_states() {
            assert!(ActionState::Succeeded.is_terminal());
            assert!(ActionState::TimedOut.is_terminal());
            assert!(ActionState::FinalFailure.is_terminal());
            assert!(!ActionState::ActionFailed.is_terminal());
        }
    }

    mod perform_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_native_click_succeeds() {
            let driver = MockDriver::new().with_element(MockElement::new(Selector::css("#go")));
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let outcome = exec
                .perform(&Locator::css("#go"), &Action::Click, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(
                outcome.trail(),
                &[
                    ActionState::Idle,
                    ActionState::AwaitingReady,
                    ActionState::Ready,
                    ActionState::Executing,
                    ActionState::Succeeded
                ]
            );
            assert!(matches!(
                outcome,
                ActionOutcome::Succeeded {
                    strategy: Strategy::Native,
                    ..
                }
            ));
            assert!(driver.was_called("click:#go"));
            assert!(!driver.was_called("dispatch_click"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_fallback_targets_displayed_match() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("#pay")).hidden().on_click(
                    MockEffect::Navigate {
                        url: "https://bank.test/wrong".into(),
                        after: Duration::ZERO,
                    },
                ))
                .with_element(
                    MockElement::new(Selector::css("#pay"))
                        .obscured_for(1, "div.modal-backdrop")
                        .on_click(MockEffect::Navigate {
                            url: "https://bank.test/paid".into(),
                            after: Duration::ZERO,
                        }),
                );
            let exec = SyncExecutor::with_config(&driver, fast_config());

            let outcome = exec
                .perform(&Locator::css("#pay"), &Action::Click, Duration::from_secs(1))
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                ActionOutcome::Succeeded {
                    strategy: Strategy::Script,
                    ..
                }
            ));
            assert_eq!(driver.current_url().await.unwrap(), "https://bank.test/paid");
        }

        #[tokio::test(start_paused = true)]
        async fn test_transient_obscuring_uses_fallback() {
            let driver = MockDriver::new().with_element(
                MockElement::new(Selector::css("#close")).obscured_for(1, "div.modal-backdrop"),
            );
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let outcome = exec
                .perform(&Locator::css("#close"), &Action::Click, Duration::from_secs(1))
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                ActionOutcome::Succeeded {
                    strategy: Strategy::Script,
                    ..
                }
            ));
            assert!(outcome.trail().contains(&ActionState::FallbackExecuting));
            assert_eq!(driver.call_count("dispatch_click:#close"), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_permanent_obscuring_is_final_failure() {
            let driver = MockDriver::new().with_element(
                MockElement::new(Selector::css("#close"))
                    .obscured("div.modal-backdrop")
                    .script_blocked(),
            );
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let outcome = exec
                .perform(&Locator::css("#close"), &Action::Click, Duration::from_secs(1))
                .await
                .unwrap();
            match &outcome {
                ActionOutcome::FinalFailure {
                    primary, fallback, ..
                } => {
                    assert!(matches!(primary, InteractionError::Obscured { .. }));
                    assert!(matches!(fallback, InteractionError::NotInteractable { .. }));
                }
                other => panic!("expected final failure, got {other:?}"),
            }
            assert_eq!(outcome.trail().last(), Some(&ActionState::FinalFailure));
            assert_eq!(driver.call_count("click:#close"), 1);
            assert_eq!(driver.call_count("dispatch_click:#close"), 1);

            let err = outcome.into_result().unwrap_err();
            assert!(err.to_string().contains("click on '#close' failed"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_is_not_retried() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("#submit")).disabled());
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let outcome = exec
                .perform(&Locator::css("#submit"), &Action::Click, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(outcome.trail().last(), Some(&ActionState::TimedOut));
            assert!(!driver.was_called("click:"));
            assert!(!driver.was_called("dispatch_click:"));
            let err = outcome.into_result().unwrap_err();
            assert!(err.to_string().contains("element '#submit' is not clickable"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_read_text() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("h1")).with_text("Payments"));
            let exec = SyncExecutor::with_config(&driver, fast_config());
            assert_eq!(exec.read_text(&Locator::css("h1")).await.unwrap(), "Payments");
        }

        #[tokio::test(start_paused = true)]
        async fn test_fill_replaces_value() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("#user")).with_value("stale"));
            let exec = SyncExecutor::with_config(&driver, fast_config());
            exec.fill(&Locator::css("#user"), "alice").await.unwrap();
            assert_eq!(driver.value_of(&Selector::css("#user")).unwrap(), "alice");
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_input_times_out() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("#amount")).hidden());
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let outcome = exec
                .perform(&Locator::css("#amount"), &Action::Fill("10".into()), Duration::ZERO)
                .await
                .unwrap();
            assert!(matches!(outcome, ActionOutcome::TimedOut { .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_session_propagates() {
            let driver = MockDriver::new();
            driver.close();
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let err = exec
                .perform(&Locator::css("#go"), &Action::Click, Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::SessionClosed { .. }));
        }
    }

    mod settle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_not_settled_while_overlay_present() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("div.loading_screen")));
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let report = exec
                .settle(Duration::from_secs(1), LoadPolicy::Required)
                .await
                .unwrap();
            assert!(!report.is_settled());
            assert!(!report.overlay.is_ready());
            assert!(report.document.is_ready());
        }

        #[tokio::test(start_paused = true)]
        async fn test_settled_after_overlay_goes() {
            let driver = MockDriver::new().with_element(
                MockElement::new(Selector::css("div.loading_screen"))
                    .vanish_after(Duration::from_millis(600)),
            );
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let report = exec
                .settle(Duration::from_secs(2), LoadPolicy::Required)
                .await
                .unwrap();
            assert!(report.is_settled());
            assert!(report.overlay.elapsed() >= Duration::from_millis(600));
        }

        #[tokio::test(start_paused = true)]
        async fn test_load_timeout_depends_on_policy() {
            let driver = MockDriver::new().loading_for(Duration::from_secs(60));
            let exec = SyncExecutor::with_config(&driver, fast_config());

            let report = exec
                .settle(Duration::from_secs(1), LoadPolicy::BestEffort)
                .await
                .unwrap();
            assert!(!report.is_settled());

            let err = exec
                .settle(Duration::from_secs(1), LoadPolicy::Required)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("document is not load-complete"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_overlay_and_document_share_one_budget() {
            let driver = MockDriver::new()
                .loading_for(Duration::from_secs(60))
                .with_element(MockElement::new(Selector::css("div.loading_screen")));
            let exec = SyncExecutor::with_config(&driver, fast_config());

            let start = Instant::now();
            let report = exec
                .settle(Duration::from_secs(1), LoadPolicy::BestEffort)
                .await
                .unwrap();
            assert!(!report.overlay.is_ready());
            assert!(!report.document.is_ready());
            assert!(start.elapsed() < Duration::from_millis(1500));
        }

        #[tokio::test(start_paused = true)]
        async fn test_click_settles_afterwards() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("#next")).on_click(MockEffect::Loading {
                    duration: Duration::from_millis(500),
                }));
            let exec = SyncExecutor::with_config(&driver, fast_config());
            exec.click(&Locator::css("#next")).await.unwrap();
            assert_eq!(driver.ready_state().await.unwrap(), "complete");
        }
    }

    mod dropdown_tests {
        use super::*;

        fn account_dropdown() -> SearchableDropdown {
            SearchableDropdown::new(
                Locator::css("div.account-select").named("Account"),
                Locator::css("div.account-select input").named("Account search"),
                Locator::css("div.account-option").named("Account options"),
            )
            .with_selected(Locator::css("div.account-value").named("Selected account"))
        }

        /// Enter copies the first option into the selected-value element
        fn dropdown_page(options: &[&str]) -> MockDriver {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("div.account-select")))
                .with_element(MockElement::new(Selector::css("div.account-select input")).on_enter(
                    MockEffect::SetText {
                        selector: Selector::css("div.account-value"),
                        text: options.first().copied().unwrap_or_default().to_string(),
                    },
                ))
                .with_element(MockElement::new(Selector::css("div.account-value")));
            for option in options {
                driver.add_element(
                    MockElement::new(Selector::css("div.account-option")).with_text(*option),
                );
            }
            driver
        }

        #[tokio::test(start_paused = true)]
        async fn test_exact_match_selects() {
            let driver = dropdown_page(&["Main Account", "Main Account 2"]);
            let exec = SyncExecutor::with_config(&driver, fast_config());

            exec.select_from_searchable_dropdown(&account_dropdown(), "Main Account")
                .await
                .unwrap();
            assert!(driver.was_called("key:div.account-select input:Ctrl+A"));
            assert!(driver.was_called("type:div.account-select input:Main Account"));
            assert!(driver.was_called("key:div.account-select input:Enter"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_no_exact_match_fails_descriptively() {
            let driver = dropdown_page(&["Main Account 2", "Savings"]);
            let exec = SyncExecutor::with_config(&driver, fast_config());

            let err = exec
                .select_from_searchable_dropdown(&account_dropdown(), "Main Account")
                .await
                .unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("no 'Account options' with text exactly 'Main Account'"));
            assert!(msg.contains("timeout after 2000ms"));
            assert!(!driver.was_called("key:div.account-select input:Enter"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_widget_confirming_near_match_fails() {
            // exact option exists, but Enter confirms the highlighted first row
            let driver = dropdown_page(&["Main Account 2", "Main Account"]);
            let exec = SyncExecutor::with_config(&driver, fast_config());

            let err = exec
                .select_from_searchable_dropdown(&account_dropdown(), "Main Account")
                .await
                .unwrap_err();
            assert!(driver.was_called("key:div.account-select input:Enter"));
            assert!(err
                .to_string()
                .contains("no 'Selected account' with text exactly 'Main Account'"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_exact_policy_needs_selected_locator() {
            let driver = dropdown_page(&["Main Account"]);
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let mut dropdown = account_dropdown();
            dropdown.selected = None;

            let err = exec
                .select_from_searchable_dropdown(&dropdown, "Main Account")
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::Config { .. }));
            assert!(driver.history().is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_first_result_policy_confirms_blindly() {
            let driver = dropdown_page(&["Main Account 2"]);
            let exec = SyncExecutor::with_config(&driver, fast_config());
            let dropdown = account_dropdown().with_policy(MatchPolicy::FirstResult);

            exec.select_from_searchable_dropdown(&dropdown, "Main Account")
                .await
                .unwrap();
            assert!(driver.was_called("key:div.account-select input:Enter"));
        }
    }
}
