//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use paysync::scenario::{ScenarioReport, StepIssue, StepStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Progress reporter for feature execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over feature files
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, message: &str) {
        match self.progress_bar {
            Some(ref pb) if !pb.is_finished() => pb.println(message),
            _ => {
                let _ = self.term.write_line(message);
            }
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, color: Style, message: &str) {
        let prefix = if self.use_color {
            color.apply_to(symbol).bold().to_string()
        } else {
            plain.to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.prefixed("✓", "PASS", Style::new().green(), message);
        }
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        self.prefixed("✗", "FAIL", Style::new().red(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.prefixed("⚠", "WARN", Style::new().yellow(), message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.prefixed("ℹ", "INFO", Style::new().blue(), message);
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print one scenario result, with its steps when `steps` is set or it failed
    pub fn scenario(&self, report: &ScenarioReport, steps: bool) {
        let label = format!("{} ({}ms)", report.name, report.duration_ms);
        if report.passed {
            self.success(&label);
        } else {
            self.failure(&label);
        }
        if report.passed && (!steps || self.quiet) {
            return;
        }
        for step in &report.steps {
            let mark = match step.status {
                StepStatus::Passed => "+",
                StepStatus::Failed => "x",
                StepStatus::Skipped => "-",
            };
            self.line(&format!("    {mark} {}", step.text));
            if let Some(ref error) = step.error {
                self.line(&format!("        {error}"));
            }
        }
        if let Some(ref url) = report.failure_url {
            self.line(&format!("    at {url}"));
        }
        if let Some(ref shot) = report.screenshot {
            self.line(&format!("    screenshot: {}", shot.display()));
        }
    }

    /// Print problems found while checking feature files
    pub fn issues(&self, feature: &str, issues: &[StepIssue]) {
        for issue in issues {
            self.failure(&format!(
                "{feature} / {}: {}: {}",
                issue.scenario, issue.step, issue.message
            ));
        }
    }

    /// Print run summary
    pub fn summary(&self, passed: usize, failed: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        self.line("");

        let total = passed + failed;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            self.line(&format!(
                "{} {} scenarios in {:.2}s ({} passed, {} failed)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            self.line(&format!(
                "{status} {total} scenarios in {duration_secs:.2}s ({passed} passed, {failed} failed)"
            ));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use paysync::scenario::StepReport;

    fn failed_scenario() -> ScenarioReport {
        ScenarioReport {
            name: "Pay groceries".into(),
            passed: false,
            steps: vec![
                StepReport {
                    text: "Given I am logged in".into(),
                    status: StepStatus::Failed,
                    duration_ms: 15_000,
                    error: Some("URL does not contain '/dashboard'".into()),
                },
                StepReport {
                    text: "Then I should see the dashboard".into(),
                    status: StepStatus::Skipped,
                    duration_ms: 0,
                    error: None,
                },
            ],
            error: Some("URL does not contain '/dashboard'".into()),
            failure_url: Some("https://bank.test/".into()),
            screenshot: None,
            duration_ms: 15_000,
        }
    }

    mod output_format_tests {
        use super::*;

        #[test]
        fn test_default_format() {
            assert_eq!(OutputFormat::default(), OutputFormat::Text);
        }
    }

    mod progress_reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = ProgressReporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
        }

        #[test]
        fn test_messages() {
            let reporter = ProgressReporter::new(false, false);
            reporter.success("passed");
            reporter.failure("failed");
            reporter.warning("warning");
            reporter.info("info");
            reporter.header("Header");
            // No panic = success
        }

        #[test]
        fn test_scenario_and_summary() {
            let reporter = ProgressReporter::new(false, false);
            reporter.scenario(&failed_scenario(), false);
            reporter.summary(1, 1, Duration::from_secs(16));
            // No panic = success
        }

        #[test]
        fn test_progress_bar() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress(2, "payments.yaml");
            reporter.scenario(&failed_scenario(), true);
            reporter.increment(1);
            reporter.set_message("login.yaml");
            reporter.increment(1);
            reporter.finish();
            // No panic = success
        }

        #[test]
        fn test_quiet_mode_suppresses_output() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(10, "hidden");
            assert!(reporter.progress_bar.is_none());
            reporter.success("hidden");
            reporter.info("hidden");
            // Failure is still printed
            reporter.failure("shown");
        }
    }
}
