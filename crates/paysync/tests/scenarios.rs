//! End-to-end scenarios against a scripted banking application.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use paysync::pages::{Amount, TransactionsPage};
use paysync::scenario::{Feature, ScenarioRunner, SessionProvider, StepStatus};
use paysync::{
    Credentials, MockDriver, MockEffect, MockElement, Selector, SuiteConfig, SyncError,
    SyncResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const FAR: Duration = Duration::from_secs(24 * 3600);

const ACCOUNT: &str =
    "//h2[normalize-space()='Select account']/following::div[contains(@class,'select')][1]";
const CATEGORY: &str =
    "//label[normalize-space()='Category']/following::div[contains(@class,'select')][1]";
const NEXT: &str = "//form//button[normalize-space()='Next']";
const CLOSE: &str = "//button[normalize-space()='Close']";
const CONFIRMATION: &str =
    "//div[contains(@class,'status')]//span[normalize-space()='Confirmation']";
const SUCCESS: &str = "//div[contains(@class,'status')]//span[normalize-space()='Success']";

/// Scripted banking application, one fresh copy per session
#[derive(Debug)]
struct BankApp {
    dashboard_after: Option<Duration>,
    dashboard_url: &'static str,
    payments_url: &'static str,
    accounts: Vec<&'static str>,
    lists_transaction: bool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Default for BankApp {
    fn default() -> Self {
        Self {
            dashboard_after: Some(Duration::from_millis(100)),
            dashboard_url: "https://bank.test/dashboard",
            payments_url: "https://bank.test/payments",
            accounts: vec!["Main Account", "Savings"],
            lists_transaction: true,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }
}

fn xpath(expr: impl Into<String>) -> MockElement {
    MockElement::new(Selector::xpath(expr))
}

fn react_select(driver: &MockDriver, container: &str, input_id: u8, labels: &[&str]) {
    let selected = format!("{container}//div[contains(@class,'singleValue')]");
    driver.add_element(xpath(format!("{container}//div[contains(@class,'control')]")));
    driver.add_element(xpath(selected.clone()));
    driver.add_element(
        MockElement::new(Selector::css(format!("input#react-select-{input_id}-input"))).on_enter(
            MockEffect::SetText {
                selector: Selector::xpath(selected),
                text: labels.first().copied().unwrap_or_default().to_string(),
            },
        ),
    );
    for label in labels {
        driver.add_element(
            MockElement::new(Selector::css(format!(
                "div[id^='react-select-{input_id}-option']"
            )))
            .with_text(*label),
        );
    }
}

impl BankApp {
    fn build(&self) -> MockDriver {
        let mut submit = xpath("//button[@type='submit']");
        if let Some(after) = self.dashboard_after {
            submit = submit.on_click(MockEffect::Navigate {
                url: self.dashboard_url.into(),
                after,
            });
        }
        let row = TransactionsPage::<MockDriver>::row_selector(&Amount::from(100), "Groceries");
        let mut close = xpath(CLOSE).on_click(MockEffect::Conceal {
            selector: Selector::xpath(CLOSE),
            after: Duration::from_millis(200),
        });
        if self.lists_transaction {
            close = close.on_click(MockEffect::Reveal {
                selector: row.clone(),
                after: Duration::from_secs(3),
            });
        }

        let driver = MockDriver::new()
            .with_element(xpath("//span[normalize-space()='Get Started']"))
            .with_element(xpath("//input[@placeholder='Email']"))
            .with_element(xpath("//input[@placeholder='Password']"))
            .with_element(submit)
            .with_element(xpath("//*[contains(text(), 'Welcome')]").with_text("Welcome, Alice"))
            .with_element(xpath("//a[normalize-space()='Payments']").on_click(
                MockEffect::Navigate {
                    url: self.payments_url.into(),
                    after: Duration::from_millis(400),
                },
            ))
            .with_element(xpath(
                "//div[contains(@class,'content')]/h1[normalize-space()='Payments']",
            ))
            .with_element(MockElement::new(Selector::css("input[name='reference']")))
            .with_element(MockElement::new(Selector::css("input[name='entity']")))
            .with_element(MockElement::new(Selector::css(
                "div.suffix_container input[name='amount']",
            )))
            .with_element(
                xpath(NEXT)
                    .on_click(MockEffect::Reveal {
                        selector: Selector::xpath(CONFIRMATION),
                        after: Duration::from_millis(300),
                    })
                    .on_click(MockEffect::Reveal {
                        selector: Selector::xpath(SUCCESS),
                        after: Duration::from_millis(600),
                    }),
            )
            .with_element(xpath(CONFIRMATION).appear_after(FAR))
            .with_element(xpath(SUCCESS).appear_after(FAR))
            .with_element(close)
            .with_element(MockElement::new(row).with_text("-100€ Groceries").appear_after(FAR));
        react_select(&driver, ACCOUNT, 3, &self.accounts);
        react_select(&driver, CATEGORY, 2, &["Groceries"]);
        driver
    }
}

#[async_trait]
impl SessionProvider for BankApp {
    type Session = MockDriver;

    async fn open(&self) -> SyncResult<MockDriver> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.build())
    }

    async fn close(&self, session: MockDriver) -> SyncResult<()> {
        session.close();
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn runner(app: BankApp) -> ScenarioRunner<BankApp> {
    ScenarioRunner::new(app, SuiteConfig::default().with_base_url("https://bank.test/"))
        .unwrap()
        .with_credentials(Credentials::new("alice@bank.test", "s3cret"))
}

const PAYMENT_FEATURE: &str = r#"
feature: Payments
background:
  - Given login and access payments page
scenarios:
  - name: Pay groceries from the main account
    steps:
      - step: When I make a payment with the following data
        table:
          - ACCOUNT: Main Account
            REFERENCE: "12345"
            ENTITY: "98765"
            AMOUNT: 100
            CATEGORY: Groceries
      - Then Verify confirmation window appears with payment details
      - When I click to proceed with payment
      - Then Verify success payment page appears
      - And Verify new transaction appears with "Groceries" category and 100 amount
"#;

const LOGIN_FEATURE: &str = r"
feature: Login
scenarios:
  - name: Dashboard after login
    steps:
      - Given I am logged in
      - Then I should see the dashboard
";

mod payment_flow {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_payment_passes() {
        let feature = Feature::from_yaml(PAYMENT_FEATURE).unwrap();
        let runner = runner(BankApp::default());
        let report = runner.run_feature(&feature).await;

        let scenario = &report.scenarios[0];
        assert!(scenario.passed, "{:?}", scenario.error);
        assert_eq!(scenario.steps.len(), 6);
        assert!(scenario.steps.iter().all(|s| s.status == StepStatus::Passed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_without_exact_match_fails_descriptively() {
        let feature = Feature::from_yaml(PAYMENT_FEATURE).unwrap();
        let report = runner(BankApp {
            accounts: vec!["Main Account 2", "Savings"],
            ..BankApp::default()
        })
        .run_feature(&feature)
        .await;

        let scenario = &report.scenarios[0];
        assert!(!scenario.passed);
        let failed = scenario.failed_step().unwrap();
        assert_eq!(failed.text, "When I make a payment with the following data");
        assert!(failed
            .error
            .as_deref()
            .unwrap()
            .contains("with text exactly 'Main Account', timeout after"));
        assert_eq!(
            scenario
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Skipped)
                .count(),
            4
        );
        assert_eq!(scenario.failure_url.as_deref(), Some("https://bank.test/payments"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_rejects_wrong_payments_route() {
        let feature = Feature::from_yaml(PAYMENT_FEATURE).unwrap();
        let report = runner(BankApp {
            payments_url: "https://bank.test/payments/history",
            ..BankApp::default()
        })
        .run_feature(&feature)
        .await;

        let scenario = &report.scenarios[0];
        assert!(!scenario.passed);
        assert_eq!(scenario.steps[0].status, StepStatus::Failed);
        assert_eq!(scenario.steps[0].text, "Given login and access payments page");
        assert!(scenario
            .error
            .as_deref()
            .unwrap()
            .contains("Payments is ready but the URL does not match '/payments'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_rejects_wrong_dashboard_route() {
        let feature = Feature::from_yaml(PAYMENT_FEATURE).unwrap();
        let app = BankApp {
            dashboard_url: "https://bank.test/dashboard/welcome",
            ..BankApp::default()
        };
        let runner = runner(app);
        let report = runner.run_feature(&feature).await;

        let scenario = &report.scenarios[0];
        assert_eq!(scenario.steps[0].status, StepStatus::Failed);
        assert!(scenario
            .error
            .as_deref()
            .unwrap()
            .contains("is ready but the URL does not match '/dashboard'"));
        assert_eq!(
            scenario.failure_url.as_deref(),
            Some("https://bank.test/dashboard/welcome")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_transaction_is_reported() {
        let feature = Feature::from_yaml(PAYMENT_FEATURE).unwrap();
        let report = runner(BankApp {
            lists_transaction: false,
            ..BankApp::default()
        })
        .run_feature(&feature)
        .await;

        let scenario = &report.scenarios[0];
        assert_eq!(scenario.steps[5].status, StepStatus::Failed);
        assert!(scenario
            .error
            .as_deref()
            .unwrap()
            .contains("Transaction NOT found (category: Groceries, amount: -100€)"));
    }
}

mod login {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_gherkin_feature_runs() {
        let feature = Feature::from_gherkin(include_str!("../../../features/login.feature")).unwrap();
        let report = runner(BankApp::default()).run_feature(&feature).await;
        assert!(report.passed(), "{:?}", report.scenarios[0].error);
        assert_eq!(report.scenarios[0].steps.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_within_budget_passes() {
        let feature = Feature::from_yaml(LOGIN_FEATURE).unwrap();
        let app = BankApp {
            dashboard_after: Some(Duration::from_secs(14)),
            ..BankApp::default()
        };
        let runner = runner(app);
        let report = runner.run_feature(&feature).await;
        assert!(report.passed(), "{:?}", report.scenarios[0].error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_never_reached_fails() {
        let feature = Feature::from_yaml(LOGIN_FEATURE).unwrap();
        let app = BankApp {
            dashboard_after: None,
            ..BankApp::default()
        };
        let runner = runner(app);
        let report = runner.run_feature(&feature).await;

        let scenario = &report.scenarios[0];
        assert!(!scenario.passed);
        assert_eq!(scenario.steps[0].status, StepStatus::Passed);
        assert!(scenario
            .error
            .as_deref()
            .unwrap()
            .starts_with("URL does not contain '/dashboard', timeout after"));
        assert_eq!(runner.provider().closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_mid_wait_is_fatal() {
        let app = BankApp {
            dashboard_after: None,
            ..BankApp::default()
        };
        let driver = app.build();
        let exec = paysync::SyncExecutor::new(&driver);
        driver.close();
        let err = exec
            .require(&paysync::WaitCondition::url_contains("/dashboard"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SessionClosed { .. }));
    }
}

mod bundled_files {
    use super::*;
    use paysync::scenario::StepMatcher;

    #[test]
    fn test_sample_features_check_clean() {
        let matcher = StepMatcher::new().unwrap();
        let features = [
            Feature::from_yaml(include_str!("../../../features/payments.yaml")).unwrap(),
            Feature::from_gherkin(include_str!("../../../features/login.feature")).unwrap(),
        ];
        for feature in &features {
            assert!(matcher.check(feature).is_empty(), "{}", feature.feature);
        }
        assert_eq!(features[1].scenarios[0].tags, vec!["smoke".to_string()]);
    }

    #[test]
    fn test_sample_config_loads() {
        let config = SuiteConfig::from_yaml(include_str!("../../../paysync.yaml")).unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.credentials.user_var, "PAYSYNC_USER");
    }
}
