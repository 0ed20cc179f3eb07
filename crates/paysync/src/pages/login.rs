//! Landing page and sign-in form.

use crate::config::Credentials;
use crate::driver::PageDriver;
use crate::executor::{Action, SyncExecutor};
use crate::locator::Locator;
use crate::page_object::PageObject;
use crate::result::{SyncError, SyncResult};
use crate::wait::WaitCondition;
use std::time::Duration;
use tracing::info;

/// Sign-in flow of the banking application
#[derive(Debug)]
pub struct LoginPage<'a, D: ?Sized> {
    exec: &'a SyncExecutor<'a, D>,
    get_started: Locator,
    username: Locator,
    password: Locator,
    submit: Locator,
    welcome: Locator,
}

impl<'a, D: PageDriver + ?Sized> LoginPage<'a, D> {
    /// Create the page over a borrowed executor
    #[must_use]
    pub fn new(exec: &'a SyncExecutor<'a, D>) -> Self {
        Self {
            exec,
            get_started: Locator::xpath("//span[normalize-space()='Get Started']")
                .named("Get Started"),
            username: Locator::xpath("//input[@placeholder='Email']").named("Email"),
            password: Locator::xpath("//input[@placeholder='Password']").named("Password"),
            submit: Locator::xpath("//button[@type='submit']").named("Login button"),
            welcome: Locator::xpath("//*[contains(text(), 'Welcome')]").named("Welcome message"),
        }
    }

    /// Navigate to the application's landing page and wait for it
    pub async fn open(&self, base_url: &str) -> SyncResult<()> {
        self.exec.open(base_url).await?;
        self.exec
            .require_within(&self.ready_condition(), self.load_timeout())
            .await
    }

    /// Reveal the sign-in form
    pub async fn click_get_started(&self) -> SyncResult<()> {
        self.exec.click(&self.get_started).await
    }

    /// Replace the username field's content
    pub async fn enter_username(&self, username: &str) -> SyncResult<()> {
        self.exec.fill(&self.username, username).await
    }

    /// Replace the password field's content
    pub async fn enter_password(&self, password: &str) -> SyncResult<()> {
        self.exec.fill(&self.password, password).await
    }

    /// Submit the form and wait until the application has finished loading
    ///
    /// Unlike most clicks, an overlay that never goes away fails the call.
    pub async fn submit(&self) -> SyncResult<()> {
        let config = self.exec.config();
        self.exec
            .perform(&self.submit, &Action::Click, config.action_timeout)
            .await?
            .into_result()?;
        self.exec
            .require(&WaitCondition::invisible(config.overlay.clone()))
            .await?;
        self.exec.require(&WaitCondition::DocumentReady).await
    }

    /// Full sign-in with the given credentials
    pub async fn login(&self, credentials: &Credentials) -> SyncResult<()> {
        info!(user = credentials.username(), "logging in");
        self.click_get_started().await?;
        self.enter_username(credentials.username()).await?;
        self.enter_password(credentials.password()).await?;
        self.submit().await
    }

    /// The browser reached the dashboard
    pub async fn verify_dashboard(&self) -> SyncResult<()> {
        self.exec.require(&WaitCondition::url_contains("/dashboard")).await
    }

    /// The dashboard greets the user
    pub async fn verify_welcome(&self) -> SyncResult<()> {
        if self
            .exec
            .is_visible_within(&self.welcome, self.exec.config().action_timeout)
            .await?
        {
            Ok(())
        } else {
            Err(SyncError::assertion(
                "Dashboard was not displayed after login",
                self.exec.current_url().await,
            ))
        }
    }
}

impl<D: PageDriver + ?Sized> PageObject for LoginPage<'_, D> {
    fn url_pattern(&self) -> &str {
        "/"
    }

    fn ready_condition(&self) -> WaitCondition {
        WaitCondition::clickable(self.get_started.clone())
    }

    fn load_timeout(&self) -> Duration {
        self.exec.config().page_timeout
    }

    fn page_name(&self) -> &str {
        "Login"
    }
}
