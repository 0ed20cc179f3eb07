//! Recent transactions list.

use super::Amount;
use crate::driver::PageDriver;
use crate::executor::SyncExecutor;
use crate::locator::{xpath_literal, Locator, Selector};
use crate::result::SyncResult;
use crate::wait::WaitCondition;
use std::time::Duration;
use tracing::info;

/// Default budget for a new transaction to be listed
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Transaction list rendered after a payment
#[derive(Debug)]
pub struct TransactionsPage<'a, D: ?Sized> {
    exec: &'a SyncExecutor<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> TransactionsPage<'a, D> {
    /// Create the page over a borrowed executor
    #[must_use]
    pub const fn new(exec: &'a SyncExecutor<'a, D>) -> Self {
        Self { exec }
    }

    /// Row listing a debit of `amount` in `category`
    #[must_use]
    pub fn row_selector(amount: &Amount, category: &str) -> Selector {
        Selector::xpath(format!(
            "//tr[contains(normalize-space(.), {}) and contains(normalize-space(.), {})]",
            xpath_literal(&amount.debit_label()),
            xpath_literal(category)
        ))
    }

    /// Whether a row with the amount and category shows up within `timeout`
    pub async fn wait_for_transaction(
        &self,
        amount: &Amount,
        category: &str,
        timeout: Duration,
    ) -> SyncResult<bool> {
        let row = Locator::from_selector(Self::row_selector(amount, category))
            .named(format!("transaction {} / {category}", amount.debit_label()));
        info!(amount = %amount.debit_label(), category, "waiting for transaction");
        Ok(self
            .exec
            .wait_until(&WaitCondition::visible(row), timeout)
            .await?
            .is_ready())
    }
}
