//! PageDriver - Abstract Browser Session Trait
//!
//! The executor never talks to a browser directly. It talks to a
//! [`PageDriver`], which bundles the three collaborators the synchronization
//! layer needs from a live session:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  PageDriver                                                    │
//! ├───────────────────────────────────────────────────────────────┤
//! │  locator resolution   find_all(selector) -> [ElementHandle]   │
//! │  native input         click / clear / type_text / press_key   │
//! │  scripting bridge     evaluate / call_on                      │
//! │                       dispatch_click / dispatch_value / ...   │
//! └───────────────────────────────────────────────────────────────┘
//!          ▲                               ▲
//!   ChromiumDriver (CDP)            MockDriver (scripted timeline)
//! ```
//!
//! Handles are opaque and short-lived. A driver must report
//! [`InteractionError::Stale`] for a handle whose node was re-rendered or
//! navigated away, never act on a different node.

use crate::locator::{js_string, Selector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Why an element that was located could not be acted on
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum InteractionError {
    /// The node behind the handle is gone (re-render or navigation)
    #[error("element is stale")]
    Stale,

    /// The node exists but does not accept the interaction
    #[error("element is not interactable: {reason}")]
    NotInteractable {
        /// Reason reported by the driver
        reason: String,
    },

    /// Another node receives the pointer event
    #[error("element is obscured by {}", .by.as_deref().unwrap_or("another element"))]
    Obscured {
        /// Description of the obscuring node, when known
        by: Option<String>,
    },
}

/// Errors reported by a driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Element-level interaction failure
    #[error(transparent)]
    Interaction(#[from] InteractionError),

    /// The browser session is gone; nothing further can succeed
    #[error("session closed: {message}")]
    SessionClosed {
        /// Error message
        message: String,
    },

    /// Protocol-level failure (CDP command rejected, transport hiccup)
    #[error("protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Script evaluation failed in the page
    #[error("script error: {message}")]
    Script {
        /// Error message
        message: String,
    },
}

impl DriverError {
    /// Whether polling can continue after this error
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionClosed { .. })
    }

    /// The interaction failure carried by this error, if any
    #[must_use]
    pub const fn interaction(&self) -> Option<&InteractionError> {
        match self {
            Self::Interaction(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse into an interaction failure for fallback bookkeeping
    #[must_use]
    pub fn into_interaction(self) -> InteractionError {
        match self {
            Self::Interaction(err) => err,
            other => InteractionError::NotInteractable {
                reason: other.to_string(),
            },
        }
    }
}

/// Opaque handle to a located element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier
    pub id: String,
    /// Selector the element was resolved from
    pub selector: Selector,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, selector: Selector) -> Self {
        Self {
            id: id.into(),
            selector,
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.selector, self.id)
    }
}

/// Observed state of an element at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementState {
    /// Rendered with a non-empty box and not hidden by CSS
    pub displayed: bool,
    /// Not disabled
    pub enabled: bool,
}

impl ElementState {
    /// Displayed and enabled
    #[must_use]
    pub const fn is_clickable(&self) -> bool {
        self.displayed && self.enabled
    }
}

/// Keys the executor can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Confirm / submit
    Enter,
    /// Move focus
    Tab,
    /// Dismiss
    Escape,
    /// Delete one character
    Backspace,
    /// Select the whole content of the focused input (Ctrl+A)
    SelectAll,
}

impl Key {
    /// DOM `key` value
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Tab => "Tab",
            Self::Escape => "Escape",
            Self::Backspace => "Backspace",
            Self::SelectAll => "a",
        }
    }

    /// DOM `code` value
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Tab => "Tab",
            Self::Escape => "Escape",
            Self::Backspace => "Backspace",
            Self::SelectAll => "KeyA",
        }
    }

    /// Windows virtual key code
    #[must_use]
    pub const fn key_code(self) -> i64 {
        match self {
            Self::Enter => 13,
            Self::Tab => 9,
            Self::Escape => 27,
            Self::Backspace => 8,
            Self::SelectAll => 65,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectAll => write!(f, "Ctrl+A"),
            other => write!(f, "{}", other.key()),
        }
    }
}

const SCROLL_CENTER_FN: &str = "function() { this.scrollIntoView({block: 'center', inline: 'nearest'}); }";
const DISPATCH_CLICK_FN: &str = "function() { this.click(); }";
const TEXT_CONTENT_FN: &str = "function() { return this.textContent || ''; }";
const SELECT_ALL_FN: &str = "function() { if (typeof this.select === 'function') { this.select(); } }";

/// Abstract driver over one browser session
///
/// Default methods implement the script fallbacks on top of
/// [`PageDriver::call_on`], so a driver only has to provide the primitives.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to URL
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Get current URL
    async fn current_url(&self) -> DriverResult<String>;

    /// Resolve a selector to the elements matching right now
    async fn find_all(&self, selector: &Selector) -> DriverResult<Vec<ElementHandle>>;

    /// Observe an element's display/enabled state
    async fn element_state(&self, element: &ElementHandle) -> DriverResult<ElementState>;

    /// Native click (pointer events at the element's center)
    async fn click(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Clear an input's value
    async fn clear(&self, element: &ElementHandle) -> DriverResult<()>;

    /// Native text entry into a focused element
    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Native key press on a focused element
    async fn press_key(&self, element: &ElementHandle, key: Key) -> DriverResult<()>;

    /// Rendered text of an element
    async fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    /// Evaluate a script expression in the page
    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;

    /// Call a function declaration with `this` bound to the element
    async fn call_on(
        &self,
        element: &ElementHandle,
        function: &str,
    ) -> DriverResult<serde_json::Value>;

    /// Capture a PNG screenshot of the viewport
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    /// `document.readyState`
    async fn ready_state(&self) -> DriverResult<String> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Scroll the element to the center of the viewport
    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()> {
        self.call_on(element, SCROLL_CENTER_FN).await.map(|_| ())
    }

    /// Fallback click: `element.click()` through the scripting bridge
    async fn dispatch_click(&self, element: &ElementHandle) -> DriverResult<()> {
        self.call_on(element, DISPATCH_CLICK_FN).await.map(|_| ())
    }

    /// Fallback input: set the value through the native setter and fire
    /// `input`/`change` so framework-controlled inputs observe it
    async fn dispatch_value(&self, element: &ElementHandle, value: &str) -> DriverResult<()> {
        let function = format!(
            "function() {{ const v = {}; \
             const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(this), 'value'); \
             if (desc && desc.set) {{ desc.set.call(this, v); }} else {{ this.value = v; }} \
             this.dispatchEvent(new Event('input', {{bubbles: true}})); \
             this.dispatchEvent(new Event('change', {{bubbles: true}})); }}",
            js_string(value)
        );
        self.call_on(element, &function).await.map(|_| ())
    }

    /// Fallback key press: synthetic keyboard events
    async fn dispatch_key(&self, element: &ElementHandle, key: Key) -> DriverResult<()> {
        if key == Key::SelectAll {
            return self.call_on(element, SELECT_ALL_FN).await.map(|_| ());
        }
        let function = format!(
            "function() {{ for (const type of ['keydown', 'keypress', 'keyup']) {{ \
             this.dispatchEvent(new KeyboardEvent(type, {{key: {k}, code: {c}, keyCode: {n}, which: {n}, bubbles: true}})); }} }}",
            k = js_string(key.key()),
            c = js_string(key.code()),
            n = key.key_code()
        );
        self.call_on(element, &function).await.map(|_| ())
    }

    /// Fallback read: `textContent` through the scripting bridge
    async fn text_content(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = self.call_on(element, TEXT_CONTENT_FN).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

// ============================================================================
// MockDriver
// ============================================================================

/// Side effect applied by the mock when an element is clicked or confirmed
#[derive(Debug, Clone)]
pub enum MockEffect {
    /// Change the URL after a delay
    Navigate {
        /// New URL
        url: String,
        /// Delay from the triggering interaction
        after: Duration,
    },
    /// Make every element with this selector appear after a delay
    Reveal {
        /// Target selector
        selector: Selector,
        /// Delay from the triggering interaction
        after: Duration,
    },
    /// Make every element with this selector disappear after a delay
    Conceal {
        /// Target selector
        selector: Selector,
        /// Delay from the triggering interaction
        after: Duration,
    },
    /// Replace the text of every element with this selector
    SetText {
        /// Target selector
        selector: Selector,
        /// New text
        text: String,
    },
    /// Put the document back into `loading` for a while
    Loading {
        /// How long the document stays in `loading`
        duration: Duration,
    },
}

/// Scripted element for [`MockDriver`]
///
/// All times are offsets from the moment the mock was created.
#[derive(Debug, Clone)]
pub struct MockElement {
    selector: Selector,
    text: String,
    value: String,
    appear_at: Duration,
    vanish_at: Option<Duration>,
    displayed: bool,
    enabled: bool,
    obscured_clicks: u32,
    obscured_by: Option<String>,
    script_blocked: bool,
    stale_reads: u32,
    revision: u32,
    select_pending: bool,
    on_click: Vec<MockEffect>,
    on_enter: Vec<MockEffect>,
}

impl MockElement {
    /// Create a displayed, enabled element present from the start
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            text: String::new(),
            value: String::new(),
            appear_at: Duration::ZERO,
            vanish_at: None,
            displayed: true,
            enabled: true,
            obscured_clicks: 0,
            obscured_by: None,
            script_blocked: false,
            stale_reads: 0,
            revision: 0,
            select_pending: false,
            on_click: Vec::new(),
            on_enter: Vec::new(),
        }
    }

    /// Set the element's text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the element's initial value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Attach to the DOM only after `delay`
    #[must_use]
    pub const fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_at = delay;
        self
    }

    /// Detach from the DOM after `delay`
    #[must_use]
    pub const fn vanish_after(mut self, delay: Duration) -> Self {
        self.vanish_at = Some(delay);
        self
    }

    /// Present in the DOM but not displayed
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Displayed but disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The first `clicks` native clicks are intercepted by `by`
    #[must_use]
    pub fn obscured_for(mut self, clicks: u32, by: impl Into<String>) -> Self {
        self.obscured_clicks = clicks;
        self.obscured_by = Some(by.into());
        self
    }

    /// Every native click is intercepted by `by`
    #[must_use]
    pub fn obscured(self, by: impl Into<String>) -> Self {
        self.obscured_for(u32::MAX, by)
    }

    /// Script dispatch on this element fails as well
    #[must_use]
    pub const fn script_blocked(mut self) -> Self {
        self.script_blocked = true;
        self
    }

    /// The next `reads` handle resolutions report a stale element
    #[must_use]
    pub const fn stale_for(mut self, reads: u32) -> Self {
        self.stale_reads = reads;
        self
    }

    /// Effect applied when the element is clicked (natively or by script)
    #[must_use]
    pub fn on_click(mut self, effect: MockEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    /// Effect applied when Enter is pressed on the element
    #[must_use]
    pub fn on_enter(mut self, effect: MockEffect) -> Self {
        self.on_enter.push(effect);
        self
    }

    fn present_at(&self, now: Duration) -> bool {
        now >= self.appear_at && self.vanish_at.map_or(true, |v| now < v)
    }
}

#[derive(Debug, Default)]
struct MockState {
    elements: Vec<MockElement>,
    urls: Vec<(Duration, String)>,
    loading_until: Duration,
    scripts: HashMap<String, Vec<(Duration, serde_json::Value)>>,
    history: Vec<String>,
    closed: bool,
}

/// Scripted driver for unit and scenario testing
///
/// The mock models a page on a timeline: elements appear, vanish, become
/// obscured, and URLs change at fixed offsets, so waits can be exercised
/// deterministically under a paused tokio clock.
#[derive(Debug)]
pub struct MockDriver {
    epoch: Instant,
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn selector_matches(query: &Selector, element: &MockElement) -> bool {
    if &element.selector == query {
        return true;
    }
    match query {
        Selector::CssWithText { css, text } => {
            matches!(&element.selector, Selector::Css(c) if c == css) && element.text.contains(text)
        }
        Selector::Text(text) => element.text.contains(text),
        _ => false,
    }
}

impl MockDriver {
    /// Create new mock driver at `about:blank`, document complete
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            state: Mutex::new(MockState {
                urls: vec![(Duration::ZERO, "about:blank".to_string())],
                ..MockState::default()
            }),
        }
    }

    /// Start at the given URL
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state().urls = vec![(Duration::ZERO, url.into())];
        self
    }

    /// Add an element
    #[must_use]
    pub fn with_element(self, element: MockElement) -> Self {
        self.add_element(element);
        self
    }

    /// Keep the document in `loading` until `delay`
    #[must_use]
    pub fn loading_for(self, delay: Duration) -> Self {
        self.state().loading_until = delay;
        self
    }

    /// Add an element after construction
    pub fn add_element(&self, element: MockElement) {
        self.state().elements.push(element);
    }

    /// Schedule a URL change at an offset from creation
    pub fn navigate_after(&self, after: Duration, url: impl Into<String>) {
        let mut state = self.state();
        state.urls.push((after, url.into()));
        state.urls.sort_by_key(|(at, _)| *at);
    }

    /// Result returned when `script` is evaluated
    pub fn set_script_result(&self, script: impl Into<String>, value: serde_json::Value) {
        self.set_script_result_after(script, Duration::ZERO, value);
    }

    /// Result returned when `script` is evaluated from `after` onwards
    pub fn set_script_result_after(
        &self,
        script: impl Into<String>,
        after: Duration,
        value: serde_json::Value,
    ) {
        let mut state = self.state();
        let entries = state.scripts.entry(script.into()).or_default();
        entries.push((after, value));
        entries.sort_by_key(|(at, _)| *at);
    }

    /// Mark the session as gone; every later call fails
    pub fn close(&self) {
        self.state().closed = true;
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if a call starting with `prefix` was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.state().history.iter().any(|c| c.starts_with(prefix))
    }

    /// Number of calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.state()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Current value of the first element with this selector
    #[must_use]
    pub fn value_of(&self, selector: &Selector) -> Option<String> {
        self.state()
            .elements
            .iter()
            .find(|e| &e.selector == selector)
            .map(|e| e.value.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Duration {
        Instant::now().duration_since(self.epoch)
    }

    fn record(state: &mut MockState, call: String) -> DriverResult<()> {
        if state.closed {
            return Err(DriverError::SessionClosed {
                message: "mock session closed".to_string(),
            });
        }
        state.history.push(call);
        Ok(())
    }

    /// Resolve a handle to its element index, consuming scripted stale reads
    fn resolve(state: &mut MockState, now: Duration, handle: &ElementHandle) -> DriverResult<usize> {
        let (index, revision) = handle
            .id
            .split_once(':')
            .and_then(|(i, r)| Some((i.parse::<usize>().ok()?, r.parse::<u32>().ok()?)))
            .ok_or(DriverError::Interaction(InteractionError::Stale))?;
        let element = state
            .elements
            .get_mut(index)
            .ok_or(DriverError::Interaction(InteractionError::Stale))?;
        if element.stale_reads > 0 {
            element.stale_reads -= 1;
            return Err(InteractionError::Stale.into());
        }
        if element.revision != revision || !element.present_at(now) {
            return Err(InteractionError::Stale.into());
        }
        Ok(index)
    }

    fn apply(state: &mut MockState, now: Duration, effects: &[MockEffect]) {
        for effect in effects {
            match effect {
                MockEffect::Navigate { url, after } => {
                    state.urls.push((now + *after, url.clone()));
                    state.urls.sort_by_key(|(at, _)| *at);
                }
                MockEffect::Reveal { selector, after } => {
                    for el in state.elements.iter_mut().filter(|e| &e.selector == selector) {
                        el.appear_at = now + *after;
                        el.vanish_at = None;
                        el.revision += 1;
                    }
                }
                MockEffect::Conceal { selector, after } => {
                    for el in state.elements.iter_mut().filter(|e| &e.selector == selector) {
                        el.vanish_at = Some(now + *after);
                    }
                }
                MockEffect::SetText { selector, text } => {
                    for el in state.elements.iter_mut().filter(|e| &e.selector == selector) {
                        el.text.clone_from(text);
                    }
                }
                MockEffect::Loading { duration } => {
                    state.loading_until = now + *duration;
                }
            }
        }
    }

    fn current_url_at(state: &MockState, now: Duration) -> String {
        state
            .urls
            .iter()
            .rev()
            .find(|(at, _)| *at <= now)
            .map(|(_, url)| url.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("navigate:{url}"))?;
        state.urls.push((now, url.to_string()));
        state.urls.sort_by_key(|(at, _)| *at);
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let now = self.now();
        let state = self.state();
        if state.closed {
            return Err(DriverError::SessionClosed {
                message: "mock session closed".to_string(),
            });
        }
        Ok(Self::current_url_at(&state, now))
    }

    async fn find_all(&self, selector: &Selector) -> DriverResult<Vec<ElementHandle>> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("find:{selector}"))?;
        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.present_at(now) && selector_matches(selector, e))
            .map(|(i, e)| ElementHandle::new(format!("{i}:{}", e.revision), e.selector.clone()))
            .collect())
    }

    async fn element_state(&self, element: &ElementHandle) -> DriverResult<ElementState> {
        let now = self.now();
        let mut state = self.state();
        let index = Self::resolve(&mut state, now, element)?;
        let el = &state.elements[index];
        Ok(ElementState {
            displayed: el.displayed,
            enabled: el.enabled,
        })
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("click:{}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        let el = &mut state.elements[index];
        if !el.displayed {
            return Err(InteractionError::NotInteractable {
                reason: "element is not displayed".to_string(),
            }
            .into());
        }
        if el.obscured_clicks > 0 {
            if el.obscured_clicks != u32::MAX {
                el.obscured_clicks -= 1;
            }
            return Err(InteractionError::Obscured {
                by: el.obscured_by.clone(),
            }
            .into());
        }
        let effects = el.on_click.clone();
        Self::apply(&mut state, now, &effects);
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("clear:{}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        state.elements[index].value.clear();
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("type:{}:{text}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        let el = &mut state.elements[index];
        if !el.displayed {
            return Err(InteractionError::NotInteractable {
                reason: "element is not displayed".to_string(),
            }
            .into());
        }
        if el.select_pending {
            el.value = text.to_string();
            el.select_pending = false;
        } else {
            el.value.push_str(text);
        }
        Ok(())
    }

    async fn press_key(&self, element: &ElementHandle, key: Key) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("key:{}:{key}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        match key {
            Key::SelectAll => state.elements[index].select_pending = true,
            Key::Enter => {
                let effects = state.elements[index].on_enter.clone();
                Self::apply(&mut state, now, &effects);
            }
            _ => {}
        }
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let now = self.now();
        let mut state = self.state();
        let index = Self::resolve(&mut state, now, element)?;
        Ok(state.elements[index].text.clone())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("evaluate:{script}"))?;
        state
            .scripts
            .get(script)
            .and_then(|entries| entries.iter().rev().find(|(at, _)| *at <= now))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| DriverError::Script {
                message: format!("no mock result for script: {script}"),
            })
    }

    async fn call_on(
        &self,
        element: &ElementHandle,
        _function: &str,
    ) -> DriverResult<serde_json::Value> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("call_on:{}", element.selector))?;
        Self::resolve(&mut state, now, element)?;
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let mut state = self.state();
        Self::record(&mut state, "screenshot".to_string())?;
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }

    async fn ready_state(&self) -> DriverResult<String> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, "ready_state".to_string())?;
        Ok(if now < state.loading_until {
            "loading".to_string()
        } else {
            "complete".to_string()
        })
    }

    async fn dispatch_click(&self, element: &ElementHandle) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("dispatch_click:{}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        if state.elements[index].script_blocked {
            return Err(InteractionError::NotInteractable {
                reason: "script dispatch rejected".to_string(),
            }
            .into());
        }
        let effects = state.elements[index].on_click.clone();
        Self::apply(&mut state, now, &effects);
        Ok(())
    }

    async fn dispatch_value(&self, element: &ElementHandle, value: &str) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("dispatch_value:{}:{value}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        let el = &mut state.elements[index];
        if el.script_blocked {
            return Err(InteractionError::NotInteractable {
                reason: "script dispatch rejected".to_string(),
            }
            .into());
        }
        el.value = value.to_string();
        Ok(())
    }

    async fn dispatch_key(&self, element: &ElementHandle, key: Key) -> DriverResult<()> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("dispatch_key:{}:{key}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        if state.elements[index].script_blocked {
            return Err(InteractionError::NotInteractable {
                reason: "script dispatch rejected".to_string(),
            }
            .into());
        }
        if key == Key::Enter {
            let effects = state.elements[index].on_enter.clone();
            Self::apply(&mut state, now, &effects);
        }
        Ok(())
    }

    async fn text_content(&self, element: &ElementHandle) -> DriverResult<String> {
        let now = self.now();
        let mut state = self.state();
        Self::record(&mut state, format!("text_content:{}", element.selector))?;
        let index = Self::resolve(&mut state, now, element)?;
        Ok(state.elements[index].text.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod error_tests {
        use super::*;

        #[test]
        fn test_obscured_message() {
            let err = InteractionError::Obscured {
                by: Some("div.loading_screen".into()),
            };
            assert_eq!(err.to_string(), "element is obscured by div.loading_screen");
            let err = InteractionError::Obscured { by: None };
            assert_eq!(err.to_string(), "element is obscured by another element");
        }

        #[test]
        fn test_fatal_only_for_closed_session() {
            assert!(DriverError::SessionClosed {
                message: "gone".into()
            }
            .is_fatal());
            assert!(!DriverError::from(InteractionError::Stale).is_fatal());
            assert!(!DriverError::Script {
                message: "x".into()
            }
            .is_fatal());
        }

        #[test]
        fn test_into_interaction() {
            let err = DriverError::from(InteractionError::Stale);
            assert_eq!(err.interaction(), Some(&InteractionError::Stale));
            assert_eq!(err.into_interaction(), InteractionError::Stale);

            let err = DriverError::Protocol {
                message: "Node not found".into(),
            };
            assert!(err.interaction().is_none());
            assert!(matches!(
                err.into_interaction(),
                InteractionError::NotInteractable { reason } if reason.contains("Node not found")
            ));
        }
    }

    mod key_tests {
        use super::*;

        #[test]
        fn test_key_codes() {
            assert_eq!(Key::Enter.key(), "Enter");
            assert_eq!(Key::Enter.key_code(), 13);
            assert_eq!(Key::SelectAll.code(), "KeyA");
            assert_eq!(Key::SelectAll.to_string(), "Ctrl+A");
            assert_eq!(Key::Tab.to_string(), "Tab");
        }
    }

    mod element_tests {
        use super::*;

        #[test]
        fn test_clickable_needs_display_and_enabled() {
            assert!(ElementState {
                displayed: true,
                enabled: true
            }
            .is_clickable());
            assert!(!ElementState {
                displayed: true,
                enabled: false
            }
            .is_clickable());
            assert!(!ElementState::default().is_clickable());
        }

        #[test]
        fn test_handle_display() {
            let handle = ElementHandle::new("3:0", Selector::css("button"));
            assert_eq!(handle.to_string(), "button#3:0");
        }
    }

    mod mock_driver_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_element_appears_on_timeline() {
            let driver = MockDriver::new().with_element(
                MockElement::new(Selector::css("#late")).appear_after(Duration::from_secs(1)),
            );
            assert!(driver.find_all(&Selector::css("#late")).await.unwrap().is_empty());
            tokio::time::advance(Duration::from_secs(1)).await;
            assert_eq!(driver.find_all(&Selector::css("#late")).await.unwrap().len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_handle_goes_stale_when_element_vanishes() {
            let driver = MockDriver::new().with_element(
                MockElement::new(Selector::css("#gone")).vanish_after(Duration::from_millis(100)),
            );
            let handle = driver.find_all(&Selector::css("#gone")).await.unwrap().remove(0);
            assert!(driver.element_state(&handle).await.is_ok());
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(
                driver.element_state(&handle).await,
                Err(DriverError::Interaction(InteractionError::Stale))
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_obscured_clicks_then_clear() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("#btn")).obscured_for(1, "div.overlay"));
            let handle = driver.find_all(&Selector::css("#btn")).await.unwrap().remove(0);
            assert!(matches!(
                driver.click(&handle).await,
                Err(DriverError::Interaction(InteractionError::Obscured { .. }))
            ));
            assert!(driver.click(&handle).await.is_ok());
            assert_eq!(driver.call_count("click:#btn"), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_click_effect_navigates() {
            let driver = MockDriver::new().with_url("https://bank.test/login").with_element(
                MockElement::new(Selector::css("#login")).on_click(MockEffect::Navigate {
                    url: "https://bank.test/dashboard".into(),
                    after: Duration::from_millis(300),
                }),
            );
            let handle = driver.find_all(&Selector::css("#login")).await.unwrap().remove(0);
            driver.click(&handle).await.unwrap();
            assert_eq!(driver.current_url().await.unwrap(), "https://bank.test/login");
            tokio::time::advance(Duration::from_millis(300)).await;
            assert_eq!(driver.current_url().await.unwrap(), "https://bank.test/dashboard");
        }

        #[tokio::test(start_paused = true)]
        async fn test_select_all_then_type_replaces_value() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("input")).with_value("old"));
            let handle = driver.find_all(&Selector::css("input")).await.unwrap().remove(0);
            driver.press_key(&handle, Key::SelectAll).await.unwrap();
            driver.type_text(&handle, "new").await.unwrap();
            assert_eq!(driver.value_of(&Selector::css("input")).unwrap(), "new");
            driver.type_text(&handle, "er").await.unwrap();
            assert_eq!(driver.value_of(&Selector::css("input")).unwrap(), "newer");
        }

        #[tokio::test(start_paused = true)]
        async fn test_text_filter_matching() {
            let driver = MockDriver::new()
                .with_element(MockElement::new(Selector::css("div.option")).with_text("Main Account"))
                .with_element(MockElement::new(Selector::css("div.option")).with_text("Savings"));
            let query = Selector::CssWithText {
                css: "div.option".into(),
                text: "Savings".into(),
            };
            assert_eq!(driver.find_all(&query).await.unwrap().len(), 1);
            assert_eq!(driver.find_all(&Selector::text("Account")).await.unwrap().len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_ready_state_timeline() {
            let driver = MockDriver::new().loading_for(Duration::from_millis(500));
            assert_eq!(driver.ready_state().await.unwrap(), "loading");
            tokio::time::advance(Duration::from_millis(500)).await;
            assert_eq!(driver.ready_state().await.unwrap(), "complete");
        }

        #[tokio::test(start_paused = true)]
        async fn test_script_results() {
            let driver = MockDriver::new();
            assert!(driver.evaluate("window.appReady").await.is_err());
            driver.set_script_result_after(
                "window.appReady",
                Duration::from_millis(200),
                serde_json::json!(true),
            );
            assert!(driver.evaluate("window.appReady").await.is_err());
            tokio::time::advance(Duration::from_millis(200)).await;
            assert_eq!(
                driver.evaluate("window.appReady").await.unwrap(),
                serde_json::json!(true)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_closed_session_is_fatal() {
            let driver = MockDriver::new();
            driver.close();
            let err = driver.find_all(&Selector::css("a")).await.unwrap_err();
            assert!(err.is_fatal());
        }
    }
}
