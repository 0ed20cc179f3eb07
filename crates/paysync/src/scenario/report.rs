//! Run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step completed
    Passed,
    /// Step failed; the scenario stopped here
    Failed,
    /// Not run because an earlier step failed
    Skipped,
}

/// Result of executing a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Step line as written
    pub text: String,
    /// Outcome
    pub status: StepStatus,
    /// Step execution time
    pub duration_ms: u64,
    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of running one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Whether every step passed
    pub passed: bool,
    /// Step results, background steps first
    pub steps: Vec<StepReport>,
    /// First failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// URL observed when the scenario failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_url: Option<String>,
    /// Screenshot captured when the scenario failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
    /// Total execution time
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// Step that failed, if any
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Result of running one feature file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureReport {
    /// Identifier shared by all artifacts of this run
    pub run_id: Uuid,
    /// Feature name
    pub feature: String,
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// End of the run
    pub finished_at: DateTime<Utc>,
    /// Scenario results, in file order
    pub scenarios: Vec<ScenarioReport>,
}

impl FeatureReport {
    /// Start an empty report
    #[must_use]
    pub fn start(feature: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            feature: feature.into(),
            started_at: now,
            finished_at: now,
            scenarios: Vec::new(),
        }
    }

    /// Stamp the end time
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Whether every scenario passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.passed)
    }

    /// Number of passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed).count()
    }

    /// Number of failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.scenarios.len() - self.passed_count()
    }

    /// Pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
