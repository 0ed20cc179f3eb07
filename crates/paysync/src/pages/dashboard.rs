//! Account overview shown after sign-in.

use crate::driver::PageDriver;
use crate::executor::SyncExecutor;
use crate::locator::Locator;
use crate::page_object::PageObject;
use crate::result::SyncResult;
use crate::wait::WaitCondition;
use std::time::Duration;

/// Dashboard with the main navigation
#[derive(Debug)]
pub struct DashboardPage<'a, D: ?Sized> {
    exec: &'a SyncExecutor<'a, D>,
    payments_nav: Locator,
    welcome: Locator,
}

impl<'a, D: PageDriver + ?Sized> DashboardPage<'a, D> {
    /// Create the page over a borrowed executor
    #[must_use]
    pub fn new(exec: &'a SyncExecutor<'a, D>) -> Self {
        Self {
            exec,
            payments_nav: Locator::xpath("//a[normalize-space()='Payments']").named("Payments navigation"),
            welcome: Locator::xpath("//*[contains(text(), 'Welcome')]").named("Welcome message"),
        }
    }

    /// Follow the navigation entry to the payments page
    pub async fn open_payments(&self) -> SyncResult<()> {
        self.exec.click(&self.payments_nav).await
    }
}

impl<D: PageDriver + ?Sized> PageObject for DashboardPage<'_, D> {
    fn url_pattern(&self) -> &str {
        "/dashboard"
    }

    fn ready_condition(&self) -> WaitCondition {
        WaitCondition::visible(self.welcome.clone())
    }

    fn load_timeout(&self) -> Duration {
        self.exec.config().page_timeout
    }

    fn page_name(&self) -> &str {
        "Dashboard"
    }
}
