//! Step matching: step text to typed payment steps.

use super::schema::{Feature, Step};
use crate::pages::{Amount, PaymentDetails};
use crate::result::{SyncError, SyncResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// A step the suite knows how to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStep {
    /// Sign in and land on the payments form
    LoginAndAccessPayments,
    /// Sign in and stay on the dashboard
    LoggedIn,
    /// The dashboard is shown and greets the user
    SeeDashboard,
    /// Fill the payment form and move to confirmation
    MakePayment(PaymentDetails),
    /// The confirmation step is shown
    VerifyConfirmation,
    /// Confirm the payment
    ProceedWithPayment,
    /// The success step is shown, then dismissed
    VerifySuccess,
    /// The transaction list shows the payment
    VerifyTransaction {
        /// Category label
        category: String,
        /// Amount paid
        amount: Amount,
    },
}

impl fmt::Display for PaymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoginAndAccessPayments => write!(f, "login and access payments page"),
            Self::LoggedIn => write!(f, "log in"),
            Self::SeeDashboard => write!(f, "see dashboard"),
            Self::MakePayment(d) => write!(f, "pay {} from '{}'", d.amount, d.account),
            Self::VerifyConfirmation => write!(f, "verify confirmation"),
            Self::ProceedWithPayment => write!(f, "proceed with payment"),
            Self::VerifySuccess => write!(f, "verify success"),
            Self::VerifyTransaction { category, amount } => {
                write!(f, "verify transaction {} / {category}", amount.debit_label())
            }
        }
    }
}

impl PaymentStep {
    /// Whether the step signs in and therefore needs credentials
    #[must_use]
    pub const fn needs_credentials(&self) -> bool {
        matches!(self, Self::LoginAndAccessPayments | Self::LoggedIn)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    LoginAndAccessPayments,
    LoggedIn,
    SeeDashboard,
    PaymentTable,
    PaymentInline,
    VerifyConfirmation,
    ProceedWithPayment,
    VerifySuccess,
    VerifyTransaction,
}

const PATTERNS: &[(Pattern, &str)] = &[
    (Pattern::LoginAndAccessPayments, r"^login and access payments page$"),
    (Pattern::LoggedIn, r"^I am logged in$"),
    (Pattern::SeeDashboard, r"^I should see the dashboard$"),
    (Pattern::PaymentTable, r"^I make a payment with the following data$"),
    (
        Pattern::PaymentInline,
        r#"^I make a payment from "([^"]*)" with reference "([^"]*)", entity "([^"]*)", amount (\d+(?:\.\d+)?) and category "([^"]*)"$"#,
    ),
    (
        Pattern::VerifyConfirmation,
        r"^Verify confirmation window appears with payment details$",
    ),
    (Pattern::ProceedWithPayment, r"^I click to proceed with payment$"),
    (Pattern::VerifySuccess, r"^Verify success payment page appears$"),
    (
        Pattern::VerifyTransaction,
        r#"^Verify new transaction appears with "([^"]*)" category and (\d+(?:\.\d+)?) amount$"#,
    ),
];

/// Step that cannot run, found by [`StepMatcher::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepIssue {
    /// Scenario name, or `background`
    pub scenario: String,
    /// Step line as written
    pub step: String,
    /// Why the step cannot run
    pub message: String,
}

/// Compiled step patterns
#[derive(Debug, Clone)]
pub struct StepMatcher {
    patterns: Vec<(Pattern, Regex)>,
}

fn table_field(row: &BTreeMap<String, String>, key: &str) -> SyncResult<String> {
    row.get(key)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| SyncError::scenario(format!("payment table is missing column {key}")))
}

impl StepMatcher {
    /// Compile the step patterns
    pub fn new() -> SyncResult<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|(kind, re)| {
                Regex::new(re)
                    .map(|re| (*kind, re))
                    .map_err(|e| SyncError::scenario(format!("bad step pattern {re}: {e}")))
            })
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Match a step against the known patterns
    pub fn parse(&self, step: &Step) -> SyncResult<PaymentStep> {
        for (kind, re) in &self.patterns {
            let Some(caps) = re.captures(&step.text) else {
                continue;
            };
            let group = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();
            return match kind {
                Pattern::LoginAndAccessPayments => Ok(PaymentStep::LoginAndAccessPayments),
                Pattern::LoggedIn => Ok(PaymentStep::LoggedIn),
                Pattern::SeeDashboard => Ok(PaymentStep::SeeDashboard),
                Pattern::PaymentTable => {
                    let row = step.table.first().ok_or_else(|| {
                        SyncError::scenario(format!("'{step}' needs a data table"))
                    })?;
                    Ok(PaymentStep::MakePayment(PaymentDetails {
                        account: table_field(row, "ACCOUNT")?,
                        reference: table_field(row, "REFERENCE")?,
                        entity: table_field(row, "ENTITY")?,
                        amount: table_field(row, "AMOUNT")?.parse()?,
                        category: table_field(row, "CATEGORY")?,
                    }))
                }
                Pattern::PaymentInline => Ok(PaymentStep::MakePayment(PaymentDetails {
                    account: group(1),
                    reference: group(2),
                    entity: group(3),
                    amount: group(4).parse()?,
                    category: group(5),
                })),
                Pattern::VerifyConfirmation => Ok(PaymentStep::VerifyConfirmation),
                Pattern::ProceedWithPayment => Ok(PaymentStep::ProceedWithPayment),
                Pattern::VerifySuccess => Ok(PaymentStep::VerifySuccess),
                Pattern::VerifyTransaction => Ok(PaymentStep::VerifyTransaction {
                    category: group(1),
                    amount: group(2).parse()?,
                }),
            };
        }
        Err(SyncError::scenario(format!("undefined step: '{step}'")))
    }

    /// Parse every step of a feature, background included
    #[must_use]
    pub fn check(&self, feature: &Feature) -> Vec<StepIssue> {
        let background = feature.background.iter().map(|s| ("background", s));
        let scenarios = feature
            .scenarios
            .iter()
            .flat_map(|sc| sc.steps.iter().map(move |s| (sc.name.as_str(), s)));
        background
            .chain(scenarios)
            .filter_map(|(scenario, spec)| {
                spec.to_step()
                    .and_then(|step| self.parse(&step))
                    .err()
                    .map(|e| StepIssue {
                        scenario: scenario.to_string(),
                        step: spec.line().to_string(),
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}
