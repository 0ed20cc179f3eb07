//! Chromium sessions over the Chrome `DevTools` Protocol.
//!
//! Compiled with the `browser` feature. [`ChromiumLauncher`] starts one
//! browser per scenario and hands out a [`ChromiumDriver`], which implements
//! [`PageDriver`] on top of chromiumoxide.

use crate::config::BrowserSettings;
use crate::driver::{
    DriverError, DriverResult, ElementHandle, ElementState, InteractionError, Key, PageDriver,
};
use crate::locator::{xpath_literal, Selector};
use crate::result::{SyncError, SyncResult};
use crate::scenario::SessionProvider;
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STATE_FN: &str = "function() { \
    if (!this.isConnected) return null; \
    const style = window.getComputedStyle(this); \
    const rect = this.getBoundingClientRect(); \
    return { \
        displayed: style.display !== 'none' && style.visibility !== 'hidden' \
            && rect.width > 0 && rect.height > 0, \
        enabled: !this.disabled \
    }; \
}";

const HIT_TEST_FN: &str = "function() { \
    this.scrollIntoView({ block: 'center', inline: 'center' }); \
    const r = this.getBoundingClientRect(); \
    const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2); \
    if (!hit || hit === this || this.contains(hit)) return null; \
    const cls = typeof hit.className === 'string' && hit.className.trim() \
        ? '.' + hit.className.trim().split(/\\s+/).join('.') : ''; \
    return hit.tagName.toLowerCase() + cls; \
}";

const CLEAR_FN: &str = "function() { \
    this.focus(); \
    if ('value' in this) { \
        this.value = ''; \
        this.dispatchEvent(new Event('input', { bubbles: true })); \
    } \
}";

const SELECT_ALL_FN: &str = "function() { this.focus(); if (this.select) this.select(); }";

/// Token of the current document; a new document gets a new token
const DOCUMENT_TOKEN_JS: &str = "(() => { \
    if (!window.__paysyncDocument) { \
        window.__paysyncDocument = Date.now().toString(36) + '-' + Math.random().toString(36).slice(2); \
    } \
    return window.__paysyncDocument; \
})()";

/// Classify a protocol failure message
fn classify(message: String) -> DriverError {
    let lower = message.to_lowercase();
    if lower.contains("no node with given id")
        || lower.contains("could not find node")
        || lower.contains("detached")
    {
        DriverError::Interaction(InteractionError::Stale)
    } else if lower.contains("not interactable") || lower.contains("scroll") {
        DriverError::Interaction(InteractionError::NotInteractable { reason: message })
    } else if lower.contains("target closed") || lower.contains("connection closed") {
        DriverError::SessionClosed { message }
    } else {
        DriverError::Protocol { message }
    }
}

fn cdp_error(err: CdpError) -> DriverError {
    match err {
        CdpError::NotFound => DriverError::Interaction(InteractionError::Stale),
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            DriverError::SessionClosed {
                message: err.to_string(),
            }
        }
        CdpError::JavascriptException(_) => DriverError::Script {
            message: err.to_string(),
        },
        other => classify(other.to_string()),
    }
}

#[derive(Debug)]
struct Entry<E> {
    element: E,
    document: String,
}

/// Element handles issued by one tab.
///
/// Each lookup replaces the handles previously issued for the same selector,
/// and handles from an earlier document are dropped, so the registry holds at
/// most one result set per selector of the current page.
#[derive(Debug)]
struct ElementRegistry<E> {
    entries: HashMap<String, Entry<E>>,
    latest: HashMap<Selector, Vec<String>>,
    next_id: u64,
}

impl<E> ElementRegistry<E> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            latest: HashMap::new(),
            next_id: 1,
        }
    }

    fn register(&mut self, selector: &Selector, document: &str, found: Vec<E>) -> Vec<String> {
        if let Some(previous) = self.latest.remove(selector) {
            for id in previous {
                self.entries.remove(&id);
            }
        }
        self.entries.retain(|_, entry| entry.document == document);
        let entries = &self.entries;
        self.latest.retain(|_, ids| {
            ids.retain(|id| entries.contains_key(id));
            !ids.is_empty()
        });

        let mut ids = Vec::with_capacity(found.len());
        for element in found {
            let id = format!("cdp-{}", self.next_id);
            self.next_id += 1;
            self.entries.insert(
                id.clone(),
                Entry {
                    element,
                    document: document.to_string(),
                },
            );
            ids.push(id);
        }
        if !ids.is_empty() {
            self.latest.insert(selector.clone(), ids.clone());
        }
        ids
    }

    fn get(&self, id: &str, document: &str) -> DriverResult<&E> {
        match self.entries.get(id) {
            Some(entry) if entry.document == document => Ok(&entry.element),
            _ => Err(InteractionError::Stale.into()),
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.latest.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// [`PageDriver`] over one Chromium tab
#[derive(Debug)]
pub struct ChromiumDriver {
    page: CdpPage,
    elements: Mutex<ElementRegistry<Element>>,
    browser: Option<CdpBrowser>,
    handler: Option<JoinHandle<()>>,
}

impl ChromiumDriver {
    /// Drive an existing tab
    #[must_use]
    pub fn attach(page: CdpPage) -> Self {
        Self {
            page,
            elements: Mutex::new(ElementRegistry::new()),
            browser: None,
            handler: None,
        }
    }

    /// Launch a browser and open a blank tab
    pub async fn launch(settings: &BrowserSettings) -> SyncResult<Self> {
        let launch_error = |message: String| SyncError::BrowserLaunch { message };

        let mut builder = CdpConfig::builder().window_size(settings.viewport_width, settings.viewport_height);
        if !settings.headless {
            builder = builder.with_head();
        }
        if !settings.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = settings.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(launch_error)?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| launch_error(e.to_string()))?;
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| launch_error(e.to_string()))?;
        info!(headless = settings.headless, "browser launched");

        let mut driver = Self::attach(page);
        driver.browser = Some(browser);
        driver.handler = Some(handle);
        Ok(driver)
    }

    /// Close the browser if this driver launched it
    pub async fn shutdown(mut self) -> SyncResult<()> {
        let result = match self.browser.as_mut() {
            Some(browser) => {
                let closed = browser.close().await.map(|_| ()).map_err(|e| SyncError::SessionClosed {
                    message: e.to_string(),
                });
                if let Err(e) = browser.wait().await {
                    warn!(error = %e, "browser process did not exit cleanly");
                }
                closed
            }
            None => Ok(()),
        };
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
        result
    }

    async fn document_token(&self) -> DriverResult<String> {
        let result = self.page.evaluate(DOCUMENT_TOKEN_JS).await.map_err(cdp_error)?;
        match result.value() {
            Some(serde_json::Value::String(token)) => Ok(token.clone()),
            other => Err(DriverError::Protocol {
                message: format!("unexpected document token {other:?}"),
            }),
        }
    }

    async fn register(&self, selector: &Selector, found: Vec<Element>) -> DriverResult<Vec<ElementHandle>> {
        let document = self.document_token().await?;
        let ids = self.elements.lock().await.register(selector, &document, found);
        debug!(%selector, matched = ids.len(), "elements registered");
        Ok(ids
            .into_iter()
            .map(|id| ElementHandle::new(id, selector.clone()))
            .collect())
    }

    async fn find_css(&self, css: &str) -> DriverResult<Vec<Element>> {
        match self.page.find_elements(css).await {
            Ok(found) => Ok(found),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(cdp_error(e)),
        }
    }

    async fn find_xpath(&self, xpath: &str) -> DriverResult<Vec<Element>> {
        match self.page.find_xpaths(xpath).await {
            Ok(found) => Ok(found),
            Err(CdpError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(cdp_error(e)),
        }
    }

    async fn call_fn(&self, element: &ElementHandle, function: &str) -> DriverResult<serde_json::Value> {
        let document = self.document_token().await?;
        let elements = self.elements.lock().await;
        let el = elements.get(&element.id, &document)?;
        let returns = el.call_js_fn(function, false).await.map_err(cdp_error)?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        debug!(url, "navigate");
        self.page.goto(url).await.map_err(cdp_error)?;
        self.elements.lock().await.clear();
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(cdp_error)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn find_all(&self, selector: &Selector) -> DriverResult<Vec<ElementHandle>> {
        let found = match selector {
            Selector::Css(css) => self.find_css(css).await?,
            Selector::XPath(xpath) => self.find_xpath(xpath).await?,
            Selector::Text(text) => {
                self.find_xpath(&format!("//body//*[text()[contains(., {})]]", xpath_literal(text)))
                    .await?
            }
            Selector::TestId(id) => {
                self.find_css(&format!("[data-testid={}]", crate::locator::js_string(id)))
                    .await?
            }
            Selector::CssWithText { css, text } => {
                let mut kept = Vec::new();
                for element in self.find_css(css).await? {
                    let content = element.inner_text().await.map_err(cdp_error)?;
                    if content.is_some_and(|c| c.contains(text.as_str())) {
                        kept.push(element);
                    }
                }
                kept
            }
        };
        self.register(selector, found).await
    }

    async fn element_state(&self, element: &ElementHandle) -> DriverResult<ElementState> {
        match self.call_fn(element, STATE_FN).await? {
            serde_json::Value::Null => Err(DriverError::Interaction(InteractionError::Stale)),
            value => serde_json::from_value(value).map_err(|e| DriverError::Protocol {
                message: e.to_string(),
            }),
        }
    }

    async fn click(&self, element: &ElementHandle) -> DriverResult<()> {
        if let serde_json::Value::String(by) = self.call_fn(element, HIT_TEST_FN).await? {
            return Err(InteractionError::Obscured { by: Some(by) }.into());
        }
        let document = self.document_token().await?;
        let elements = self.elements.lock().await;
        let el = elements.get(&element.id, &document)?;
        el.click().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> DriverResult<()> {
        self.call_fn(element, CLEAR_FN).await.map(|_| ())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let document = self.document_token().await?;
        let elements = self.elements.lock().await;
        let el = elements.get(&element.id, &document)?;
        el.focus().await.map_err(cdp_error)?;
        el.type_str(text).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn press_key(&self, element: &ElementHandle, key: Key) -> DriverResult<()> {
        if key == Key::SelectAll {
            return self.call_fn(element, SELECT_ALL_FN).await.map(|_| ());
        }
        let document = self.document_token().await?;
        let elements = self.elements.lock().await;
        let el = elements.get(&element.id, &document)?;
        el.press_key(key.key()).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        let document = self.document_token().await?;
        let elements = self.elements.lock().await;
        let el = elements.get(&element.id, &document)?;
        Ok(el.inner_text().await.map_err(cdp_error)?.unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(cdp_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn call_on(&self, element: &ElementHandle, function: &str) -> DriverResult<serde_json::Value> {
        self.call_fn(element, function).await
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self.page.execute(params).await.map_err(cdp_error)?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| DriverError::Protocol {
                message: e.to_string(),
            })
    }
}

/// Launches one Chromium per scenario
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    /// Create a launcher
    #[must_use]
    pub const fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionProvider for ChromiumLauncher {
    type Session = ChromiumDriver;

    async fn open(&self) -> SyncResult<ChromiumDriver> {
        ChromiumDriver::launch(&self.settings).await
    }

    async fn close(&self, session: ChromiumDriver) -> SyncResult<()> {
        session.shutdown().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stale() {
        let err = classify("No node with given id found".into());
        assert!(matches!(err, DriverError::Interaction(InteractionError::Stale)));
    }

    #[test]
    fn test_classify_closed() {
        assert!(classify("Target closed".into()).is_fatal());
    }

    #[test]
    fn test_classify_other_is_protocol() {
        let err = classify("Cannot find context with specified id".into());
        assert!(matches!(err, DriverError::Protocol { .. }));
        assert!(!err.is_fatal());
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_lookup_replaces_previous_handles() {
            let mut registry = ElementRegistry::new();
            let selector = Selector::css("div.loading_screen");
            let first = registry.register(&selector, "doc-a", vec!["overlay"]);
            for _ in 0..50 {
                registry.register(&selector, "doc-a", vec!["overlay"]);
            }
            let latest = registry.register(&selector, "doc-a", vec!["overlay"]);

            assert_eq!(registry.len(), 1);
            assert!(registry.get(&latest[0], "doc-a").is_ok());
            let err = registry.get(&first[0], "doc-a").unwrap_err();
            assert!(matches!(err, DriverError::Interaction(InteractionError::Stale)));
        }

        #[test]
        fn test_other_selectors_keep_their_handles() {
            let mut registry = ElementRegistry::new();
            let button = registry.register(&Selector::text("Pay"), "doc-a", vec!["pay"]);
            registry.register(&Selector::css("input"), "doc-a", vec!["a", "b"]);
            assert_eq!(registry.get(&button[0], "doc-a").unwrap(), &"pay");
            assert_eq!(registry.len(), 3);
        }

        #[test]
        fn test_new_document_makes_handles_stale() {
            let mut registry = ElementRegistry::new();
            let old = registry.register(&Selector::text("Pay"), "doc-a", vec!["pay"]);
            assert!(registry.get(&old[0], "doc-b").is_err());

            registry.register(&Selector::css("input"), "doc-b", vec!["amount"]);
            assert_eq!(registry.len(), 1);
            assert!(registry.get(&old[0], "doc-a").is_err());
        }

        #[test]
        fn test_ids_are_never_reused() {
            let mut registry = ElementRegistry::new();
            let selector = Selector::css("tr");
            let a = registry.register(&selector, "doc-a", vec!["row"]);
            registry.clear();
            let b = registry.register(&selector, "doc-a", vec!["row"]);
            assert_ne!(a, b);
            assert_eq!(b[0], "cdp-2");
        }

        #[test]
        fn test_empty_lookup_drops_previous_set() {
            let mut registry = ElementRegistry::new();
            let selector = Selector::css("div.loading_screen");
            let old = registry.register(&selector, "doc-a", vec!["overlay"]);
            assert!(registry.register(&selector, "doc-a", Vec::new()).is_empty());
            assert_eq!(registry.len(), 0);
            assert!(registry.get(&old[0], "doc-a").is_err());
        }
    }

    #[tokio::test]
    #[ignore = "requires chromium"]
    async fn test_launch_and_read_title() {
        let driver = ChromiumDriver::launch(&BrowserSettings::default().with_no_sandbox())
            .await
            .unwrap();
        driver
            .navigate("data:text/html,<title>paysync</title><button>Pay</button>")
            .await
            .unwrap();
        assert_eq!(driver.evaluate("document.title").await.unwrap(), "paysync");
        let buttons = driver.find_all(&Selector::text("Pay")).await.unwrap();
        assert_eq!(buttons.len(), 1);
        assert!(driver.element_state(&buttons[0]).await.unwrap().is_clickable());

        driver
            .navigate("data:text/html,<title>next</title><button>Pay</button>")
            .await
            .unwrap();
        let err = driver.element_state(&buttons[0]).await.unwrap_err();
        assert!(matches!(err, DriverError::Interaction(InteractionError::Stale)));
        driver.shutdown().await.unwrap();
    }
}
