//! Scenario runner with per-scenario session lifecycle.
//!
//! Implements:
//! - One fresh browser session per scenario, closed even when a step fails
//! - Background steps before every scenario
//! - Stop at the first failing step, remaining steps reported as skipped
//! - Failure context: current URL and an optional screenshot

use super::report::{FeatureReport, ScenarioReport, StepReport, StepStatus};
use super::schema::{Feature, Scenario, Step, StepSpec};
use super::steps::{PaymentStep, StepIssue, StepMatcher};
use crate::config::{Credentials, SuiteConfig};
use crate::driver::PageDriver;
use crate::executor::SyncExecutor;
use crate::page_object::wait_for_page;
use crate::pages::{DashboardPage, LoginPage, PaymentDetails, PaymentsPage, TransactionsPage};
use crate::result::{SyncError, SyncResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Opens and closes browser sessions for the runner
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Driver type of an open session
    type Session: PageDriver;

    /// Open a fresh session
    async fn open(&self) -> SyncResult<Self::Session>;

    /// Tear the session down
    async fn close(&self, session: Self::Session) -> SyncResult<()>;
}

/// State carried from one step to the next within a scenario
#[derive(Debug, Default)]
pub struct World {
    /// Last payment submitted
    pub last_payment: Option<PaymentDetails>,
}

/// Runs feature files against sessions from a [`SessionProvider`]
#[derive(Debug)]
pub struct ScenarioRunner<P> {
    provider: P,
    config: SuiteConfig,
    credentials: Option<Credentials>,
    matcher: StepMatcher,
    artifacts_dir: Option<PathBuf>,
    tag: Option<String>,
    fail_fast: bool,
}

fn millis(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

impl<P: SessionProvider> ScenarioRunner<P> {
    /// Create a runner
    pub fn new(provider: P, config: SuiteConfig) -> SyncResult<Self> {
        Ok(Self {
            provider,
            config,
            credentials: None,
            matcher: StepMatcher::new()?,
            artifacts_dir: None,
            tag: None,
            fail_fast: false,
        })
    }

    /// Credentials used by login steps
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Directory for failure screenshots
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Only run scenarios carrying this tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Stop the feature after the first failed scenario
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Session provider in use
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Parse every step without opening a session
    #[must_use]
    pub fn check(&self, feature: &Feature) -> Vec<StepIssue> {
        self.matcher.check(feature)
    }

    fn parse_spec(&self, spec: &StepSpec) -> SyncResult<(Step, PaymentStep)> {
        let step = spec.to_step()?;
        let parsed = self.matcher.parse(&step)?;
        Ok((step, parsed))
    }

    /// Run every selected scenario of a feature
    pub async fn run_feature(&self, feature: &Feature) -> FeatureReport {
        let mut report = FeatureReport::start(feature.feature.clone());
        info!(feature = %feature.feature, run_id = %report.run_id, "running feature");

        for scenario in feature.scenarios_tagged(self.tag.as_deref()) {
            let result = self.run_scenario(&feature.background, scenario).await;
            let failed = !result.passed;
            report.scenarios.push(result);
            if failed && self.fail_fast {
                warn!("fail-fast: skipping remaining scenarios");
                break;
            }
        }

        report.finish();
        info!(
            feature = %feature.feature,
            passed = report.passed_count(),
            failed = report.failed_count(),
            "feature finished"
        );
        report
    }

    /// Run one scenario in a fresh session
    pub async fn run_scenario(
        &self,
        background: &[StepSpec],
        scenario: &Scenario,
    ) -> ScenarioReport {
        let start = Instant::now();
        info!(scenario = %scenario.name, "scenario started");
        let specs: Vec<&StepSpec> = background.iter().chain(&scenario.steps).collect();

        let mut parsed = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            match self.parse_spec(spec) {
                Ok(step) => parsed.push(step),
                Err(e) => {
                    return Self::failed_before_start(scenario, &specs, Some(index), &e, start)
                }
            }
        }

        let login = parsed.iter().position(|(_, p)| p.needs_credentials());
        if self.credentials.is_none() && login.is_some() {
            let err = SyncError::config("credentials are required for login steps");
            return Self::failed_before_start(scenario, &specs, login, &err, start);
        }

        let session = match self.provider.open().await {
            Ok(session) => session,
            Err(e) => return Self::failed_before_start(scenario, &specs, None, &e, start),
        };

        let mut report = self.run_steps(&session, scenario, &parsed).await;

        if let Err(e) = self.provider.close(session).await {
            warn!(scenario = %scenario.name, error = %e, "closing session failed");
        }
        report.duration_ms = millis(start);
        info!(scenario = %scenario.name, passed = report.passed, "scenario finished");
        report
    }

    async fn run_steps(
        &self,
        session: &P::Session,
        scenario: &Scenario,
        steps: &[(Step, PaymentStep)],
    ) -> ScenarioReport {
        let exec = SyncExecutor::with_config(session, self.config.executor_config());
        let mut world = World::default();
        let mut reports = Vec::with_capacity(steps.len());
        let mut failure: Option<SyncError> = None;

        for (step, payment_step) in steps {
            if failure.is_some() {
                reports.push(StepReport {
                    text: step.to_string(),
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                    error: None,
                });
                continue;
            }
            let start = Instant::now();
            info!(step = %step, "step");
            let result = self.execute(&exec, &mut world, payment_step).await;
            let error = result.as_ref().err().map(ToString::to_string);
            reports.push(StepReport {
                text: step.to_string(),
                status: if result.is_ok() {
                    StepStatus::Passed
                } else {
                    StepStatus::Failed
                },
                duration_ms: millis(start),
                error,
            });
            if let Err(e) = result {
                error!(step = %step, error = %e, "step failed");
                failure = Some(e);
            }
        }

        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            passed: failure.is_none(),
            steps: reports,
            error: failure.as_ref().map(ToString::to_string),
            failure_url: None,
            screenshot: None,
            duration_ms: 0,
        };
        if failure.is_some() {
            report.failure_url = exec.current_url().await;
            if self.config.browser.screenshot_on_failure {
                report.screenshot = self.capture(&exec, &scenario.name).await;
            }
        }
        report
    }

    async fn capture(&self, exec: &SyncExecutor<'_, P::Session>, name: &str) -> Option<PathBuf> {
        let dir = self.artifacts_dir.as_deref()?;
        let bytes = match exec.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "screenshot failed");
                return None;
            }
        };
        let path = dir.join(format!("{}.png", slug(name)));
        match write_artifact(&path, &bytes).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "writing screenshot failed");
                None
            }
        }
    }

    fn failed_before_start(
        scenario: &Scenario,
        specs: &[&StepSpec],
        failing: Option<usize>,
        err: &SyncError,
        start: Instant,
    ) -> ScenarioReport {
        error!(scenario = %scenario.name, error = %err, "scenario could not start");
        let steps = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let is_failing = failing == Some(index);
                StepReport {
                    text: spec.line().to_string(),
                    status: if is_failing {
                        StepStatus::Failed
                    } else {
                        StepStatus::Skipped
                    },
                    duration_ms: 0,
                    error: is_failing.then(|| err.to_string()),
                }
            })
            .collect();
        ScenarioReport {
            name: scenario.name.clone(),
            passed: false,
            steps,
            error: Some(err.to_string()),
            failure_url: None,
            screenshot: None,
            duration_ms: millis(start),
        }
    }

    fn credentials(&self) -> SyncResult<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| SyncError::config("credentials are required for login steps"))
    }

    async fn execute(
        &self,
        exec: &SyncExecutor<'_, P::Session>,
        world: &mut World,
        step: &PaymentStep,
    ) -> SyncResult<()> {
        match step {
            PaymentStep::LoginAndAccessPayments => {
                let login = LoginPage::new(exec);
                login.open(&self.config.base_url).await?;
                login.login(self.credentials()?).await?;
                login.verify_dashboard().await?;
                let dashboard = DashboardPage::new(exec);
                wait_for_page(exec, &dashboard).await?;
                dashboard.open_payments().await?;
                self.payments(exec).wait_loaded().await
            }
            PaymentStep::LoggedIn => {
                let login = LoginPage::new(exec);
                login.open(&self.config.base_url).await?;
                login.login(self.credentials()?).await
            }
            PaymentStep::SeeDashboard => {
                let login = LoginPage::new(exec);
                login.verify_dashboard().await?;
                login.verify_welcome().await
            }
            PaymentStep::MakePayment(details) => {
                self.payments(exec).make_payment(details).await?;
                world.last_payment = Some(details.clone());
                Ok(())
            }
            PaymentStep::VerifyConfirmation => {
                if self.payments(exec).is_confirmation_visible().await? {
                    Ok(())
                } else {
                    Err(SyncError::assertion("Confirmation NOT visible", exec.current_url().await))
                }
            }
            PaymentStep::ProceedWithPayment => self.payments(exec).confirm_payment().await,
            PaymentStep::VerifySuccess => {
                let payments = self.payments(exec);
                if !payments.is_success_visible().await? {
                    return Err(SyncError::assertion("Success NOT visible", exec.current_url().await));
                }
                payments.close_success_screen().await
            }
            PaymentStep::VerifyTransaction { category, amount } => {
                if let Some(last) = &world.last_payment {
                    if &last.amount != amount || &last.category != category {
                        warn!(
                            expected = %last.amount,
                            checking = %amount,
                            "verifying a transaction that differs from the last payment"
                        );
                    }
                }
                let found = TransactionsPage::new(exec)
                    .wait_for_transaction(amount, category, self.config.transaction_timeout())
                    .await?;
                if found {
                    Ok(())
                } else {
                    Err(SyncError::assertion(
                        format!(
                            "Transaction NOT found (category: {category}, amount: {})",
                            amount.debit_label()
                        ),
                        exec.current_url().await,
                    ))
                }
            }
        }
    }

    fn payments<'e>(&self, exec: &'e SyncExecutor<'e, P::Session>) -> PaymentsPage<'e, P::Session> {
        PaymentsPage::new(exec).with_match_policy(self.config.dropdown_policy)
    }
}

async fn write_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}
