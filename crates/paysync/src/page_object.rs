//! Page Object Model Support
//!
//! A page object owns the locators of one screen and exposes its user-level
//! operations. Pages borrow a [`SyncExecutor`] for the duration of a step, so
//! they never hold on to the browser session themselves.

use crate::driver::PageDriver;
use crate::executor::SyncExecutor;
use crate::result::{SyncError, SyncResult};
use crate::wait::WaitCondition;
use std::time::Duration;
use tracing::debug;

/// Trait for page objects representing a page of the application.
///
/// # Example
///
/// ```ignore
/// struct StatementsPage;
///
/// impl PageObject for StatementsPage {
///     fn url_pattern(&self) -> &str {
///         "/statements"
///     }
///
///     fn ready_condition(&self) -> WaitCondition {
///         WaitCondition::visible(Locator::css("h1").with_text("Statements"))
///     }
/// }
/// ```
pub trait PageObject {
    /// URL path pattern that matches this page (e.g., "/payments", "/accounts/:id")
    fn url_pattern(&self) -> &str;

    /// Condition that holds once the page can be interacted with
    fn ready_condition(&self) -> WaitCondition;

    /// Budget for the page to become ready
    fn load_timeout(&self) -> Duration {
        Duration::from_secs(12)
    }

    /// Get the page name for logging/debugging
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Wait until `page` is ready and the browser is on its URL
pub async fn wait_for_page<P, D>(exec: &SyncExecutor<'_, D>, page: &P) -> SyncResult<()>
where
    P: PageObject + ?Sized,
    D: PageDriver + ?Sized,
{
    debug!(page = page.page_name(), "waiting for page");
    exec.require_within(&page.ready_condition(), page.load_timeout())
        .await?;

    let url = exec.current_url().await;
    let matcher = UrlMatcher::new(page.url_pattern());
    match url.as_deref() {
        Some(current) if matcher.matches_url(current) => Ok(()),
        _ => Err(SyncError::assertion(
            format!(
                "{} is ready but the URL does not match '{}'",
                page.page_name(),
                page.url_pattern()
            ),
            url,
        )),
    }
}

/// URL path matcher for page objects
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    segments: Vec<UrlSegment>,
}

/// `*` and `:name` both match any single segment
#[derive(Debug, Clone)]
enum UrlSegment {
    Literal(String),
    Any,
}

/// Path component of a full URL, without query or fragment
fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = if url.contains("://") {
        rest.find('/').map_or("", |i| &rest[i..])
    } else {
        rest
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

impl UrlMatcher {
    /// Create a new URL matcher from a pattern
    ///
    /// Patterns support:
    /// - Literal segments: `/payments`
    /// - Wildcards: `/accounts/*`
    /// - Named parameters: `/accounts/:id`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" || s.starts_with(':') {
                    UrlSegment::Any
                } else {
                    UrlSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self { segments }
    }

    fn path_segments(url: &str) -> Vec<&str> {
        url_path(url).split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Check if a full URL's path matches the pattern
    ///
    /// Wildcards and parameters each consume exactly one segment.
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        let url_segments = Self::path_segments(url);
        url_segments.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(&url_segments)
                .all(|(segment, actual)| match segment {
                    UrlSegment::Literal(lit) => lit == actual,
                    UrlSegment::Any => true,
                })
    }
}
