//! Feature files, step matching and the scenario runner.

mod report;
mod runner;
mod schema;
mod steps;

pub use report::{FeatureReport, ScenarioReport, StepReport, StepStatus};
pub use runner::{ScenarioRunner, SessionProvider, World};
pub use schema::{Feature, Keyword, Scenario, Step, StepSpec};
pub use steps::{PaymentStep, StepIssue, StepMatcher};
