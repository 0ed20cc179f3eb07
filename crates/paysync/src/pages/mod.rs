//! Page objects of the banking application
//!
//! | Page | Screen | Main operations |
//! |------|--------|-----------------|
//! | [`LoginPage`] | landing + sign-in form | `login`, `verify_dashboard` |
//! | [`DashboardPage`] | account overview | `open_payments` |
//! | [`PaymentsPage`] | payment stepper | `make_payment`, `confirm_payment` |
//! | [`TransactionsPage`] | recent transactions list | `wait_for_transaction` |

mod dashboard;
mod login;
mod payments;
mod transactions;

pub use dashboard::DashboardPage;
pub use login::LoginPage;
pub use payments::{PaymentDetails, PaymentsPage};
pub use transactions::TransactionsPage;

use crate::result::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Non-negative decimal amount, kept as text so no precision is lost
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    units: String,
    fraction: Option<String>,
}

impl Amount {
    /// Plain rendering without exponent or leading zeros (`"100"`, `"12.50"`)
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        match &self.fraction {
            Some(fraction) => format!("{}.{fraction}", self.units),
            None => self.units.clone(),
        }
    }

    /// How the application lists an outgoing payment of this amount
    #[must_use]
    pub fn debit_label(&self) -> String {
        format!("-{}€", self.to_plain_string())
    }
}

impl FromStr for Amount {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (units, fraction) = match trimmed.split_once('.') {
            Some((units, fraction)) => (units, Some(fraction)),
            None => (trimmed, None),
        };
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(units) || fraction.is_some_and(|f| !digits(f)) {
            return Err(SyncError::scenario(format!("invalid amount '{s}'")));
        }
        let units = units.trim_start_matches('0');
        Ok(Self {
            units: (if units.is_empty() { "0" } else { units }).to_string(),
            fraction: fraction.map(str::to_string),
        })
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self {
            units: value.to_string(),
            fraction: None,
        }
    }
}

impl TryFrom<String> for Amount {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_plain_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
