//! Payment stepper: form, confirmation, success.

use super::Amount;
use crate::driver::PageDriver;
use crate::executor::{MatchPolicy, SearchableDropdown, SyncExecutor};
use crate::locator::Locator;
use crate::page_object::{wait_for_page, PageObject};
use crate::result::SyncResult;
use crate::wait::WaitCondition;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Everything the payment form asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Source account label, as listed in the account dropdown
    pub account: String,
    /// Payment reference
    pub reference: String,
    /// Payee entity
    pub entity: String,
    /// Amount to pay
    pub amount: Amount,
    /// Category label, as listed in the category dropdown
    pub category: String,
}

fn react_select(heading: &str, input_id: u8) -> SearchableDropdown {
    let container = format!("{heading}/following::div[contains(@class,'select')][1]");
    SearchableDropdown::new(
        Locator::xpath(format!("{container}//div[contains(@class,'control')]")),
        Locator::css(format!("input#react-select-{input_id}-input")),
        Locator::css(format!("div[id^='react-select-{input_id}-option']")),
    )
    .with_selected(Locator::xpath(format!(
        "{container}//div[contains(@class,'singleValue')]"
    )))
}

/// Payments page
#[derive(Debug)]
pub struct PaymentsPage<'a, D: ?Sized> {
    exec: &'a SyncExecutor<'a, D>,
    heading: Locator,
    account: SearchableDropdown,
    category: SearchableDropdown,
    reference: Locator,
    entity: Locator,
    amount: Locator,
    next: Locator,
    status_confirmation: Locator,
    status_success: Locator,
    close: Locator,
}

impl<'a, D: PageDriver + ?Sized> PaymentsPage<'a, D> {
    /// Create the page over a borrowed executor
    #[must_use]
    pub fn new(exec: &'a SyncExecutor<'a, D>) -> Self {
        let mut account = react_select("//h2[normalize-space()='Select account']", 3);
        account.control = account.control.named("Account");
        account.options = account.options.named("Account options");
        let mut category = react_select("//label[normalize-space()='Category']", 2);
        category.control = category.control.named("Category");
        category.options = category.options.named("Category options");

        Self {
            exec,
            heading: Locator::xpath("//div[contains(@class,'content')]/h1[normalize-space()='Payments']")
                .named("Payments heading"),
            account,
            category,
            reference: Locator::css("input[name='reference']").named("Reference"),
            entity: Locator::css("input[name='entity']").named("Entity"),
            amount: Locator::css("div.suffix_container input[name='amount']").named("Amount"),
            next: Locator::xpath("//form//button[normalize-space()='Next']").named("Next button"),
            status_confirmation: Locator::xpath(
                "//div[contains(@class,'status')]//span[normalize-space()='Confirmation']",
            )
            .named("Confirmation status"),
            status_success: Locator::xpath(
                "//div[contains(@class,'status')]//span[normalize-space()='Success']",
            )
            .named("Success status"),
            close: Locator::xpath("//button[normalize-space()='Close']").named("Close button"),
        }
    }

    /// Match policy for both dropdowns
    #[must_use]
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.account.policy = policy;
        self.category.policy = policy;
        self
    }

    /// Wait until the form can be used
    ///
    /// A lingering overlay is tolerated; the payments URL, a complete
    /// document and the heading are required.
    pub async fn wait_loaded(&self) -> SyncResult<()> {
        let timeout = self.load_timeout();
        let overlay = self
            .exec
            .wait_until(&WaitCondition::invisible(self.exec.config().overlay.clone()), timeout)
            .await?;
        if !overlay.is_ready() {
            warn!("overlay still shown on payments page, continuing");
        }
        self.exec
            .require_within(&WaitCondition::url_contains("/payments"), timeout)
            .await?;
        self.exec
            .require_within(&WaitCondition::DocumentReady, timeout)
            .await?;
        wait_for_page(self.exec, self).await
    }

    /// Pick the source account
    pub async fn select_account(&self, label: &str) -> SyncResult<()> {
        self.exec
            .select_from_searchable_dropdown(&self.account, label)
            .await
    }

    /// Fill the reference field
    pub async fn enter_reference(&self, reference: &str) -> SyncResult<()> {
        self.exec.fill(&self.reference, reference).await
    }

    /// Fill the entity field
    pub async fn enter_entity(&self, entity: &str) -> SyncResult<()> {
        self.exec.fill(&self.entity, entity).await
    }

    /// Fill the amount field with the plain decimal rendering
    pub async fn enter_amount(&self, amount: &Amount) -> SyncResult<()> {
        self.exec.fill(&self.amount, &amount.to_plain_string()).await
    }

    /// Pick the category
    pub async fn enter_category(&self, category: &str) -> SyncResult<()> {
        self.exec
            .select_from_searchable_dropdown(&self.category, category)
            .await
    }

    /// Submit the form and wait for the confirmation step
    pub async fn go_next_to_confirmation(&self) -> SyncResult<()> {
        self.exec.click(&self.next).await?;
        self.exec
            .require_within(
                &WaitCondition::visible(self.status_confirmation.clone()),
                self.exec.config().page_timeout,
            )
            .await
    }

    /// Fill the whole form and move to the confirmation step
    pub async fn make_payment(&self, details: &PaymentDetails) -> SyncResult<()> {
        info!(account = %details.account, amount = %details.amount, category = %details.category, "making payment");
        self.wait_loaded().await?;
        self.select_account(&details.account).await?;
        self.enter_reference(&details.reference).await?;
        self.enter_entity(&details.entity).await?;
        self.enter_amount(&details.amount).await?;
        self.enter_category(&details.category).await?;
        self.go_next_to_confirmation().await
    }

    /// Whether the confirmation step shows up within the page timeout
    pub async fn is_confirmation_visible(&self) -> SyncResult<bool> {
        self.exec
            .is_visible_within(&self.status_confirmation, self.exec.config().page_timeout)
            .await
    }

    /// Confirm and wait for the success step
    pub async fn confirm_payment(&self) -> SyncResult<()> {
        self.exec.click(&self.next).await?;
        self.exec
            .require_within(
                &WaitCondition::visible(self.status_success.clone()),
                self.exec.config().page_timeout,
            )
            .await
    }

    /// Whether the success step shows up within the page timeout
    pub async fn is_success_visible(&self) -> SyncResult<bool> {
        self.exec
            .is_visible_within(&self.status_success, self.exec.config().page_timeout)
            .await
    }

    /// Dismiss the success panel
    ///
    /// The close button may sit under a fading overlay, so the click relies
    /// on the executor's script fallback. The overlay itself is waited for
    /// but never fails the call.
    pub async fn close_success_screen(&self) -> SyncResult<()> {
        let timeout = self.exec.config().page_timeout;
        self.exec.click(&self.close).await?;
        self.exec
            .require_within(&WaitCondition::invisible(self.close.clone()), timeout)
            .await?;
        let overlay = self
            .exec
            .wait_until(&WaitCondition::invisible(self.exec.config().overlay.clone()), timeout)
            .await?;
        if !overlay.is_ready() {
            warn!("overlay still shown after closing success screen, continuing");
        }
        Ok(())
    }
}

impl<D: PageDriver + ?Sized> PageObject for PaymentsPage<'_, D> {
    fn url_pattern(&self) -> &str {
        "/payments"
    }

    fn ready_condition(&self) -> WaitCondition {
        WaitCondition::visible(self.heading.clone())
    }

    fn load_timeout(&self) -> Duration {
        self.exec.config().page_timeout
    }

    fn page_name(&self) -> &str {
        "Payments"
    }
}
