//! Suite runner: configuration, preflight checks, execution and reports

use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use paysync::scenario::{Feature, FeatureReport, StepMatcher};
use paysync::{read_env_file, Credentials, MatchPolicy, SuiteConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Effective suite configuration: file, then environment, then flags
pub fn load_suite_config(path: Option<&Path>, args: Option<&RunArgs>) -> CliResult<SuiteConfig> {
    let mut config = match path {
        Some(path) => SuiteConfig::load(path)?,
        None => SuiteConfig::default(),
    }
    .apply_env()?;

    if let Some(args) = args {
        if let Some(ref url) = args.base_url {
            config = config.with_base_url(url.clone());
        }
        if args.headed {
            config.browser = config.browser.with_headless(false);
        }
        if args.no_sandbox {
            config.browser = config.browser.with_no_sandbox();
        }
        if let Some(ref path) = args.chromium_path {
            config.browser = config.browser.with_chromium_path(path.clone());
        }
        if args.first_result {
            config.dropdown_policy = MatchPolicy::FirstResult;
        }
    }
    config.validate()?;
    Ok(config)
}

/// Parse feature files in the given order
pub fn load_features(paths: &[PathBuf]) -> CliResult<Vec<Feature>> {
    paths
        .iter()
        .map(|path| Feature::load(path).map_err(CliError::from))
        .collect()
}

/// Report every step that cannot run; returns the number of problems
pub fn check_features(features: &[Feature], reporter: &ProgressReporter) -> CliResult<usize> {
    let matcher = StepMatcher::new()?;
    let mut count = 0;
    for feature in features {
        let issues = matcher.check(feature);
        if issues.is_empty() {
            reporter.success(&format!(
                "{} ({} scenarios)",
                feature.feature,
                feature.scenarios.len()
            ));
        } else {
            reporter.issues(&feature.feature, &issues);
        }
        count += issues.len();
    }
    Ok(count)
}

/// Credentials from the environment or the dotenv file; `None` when unset
pub fn load_credentials(suite: &SuiteConfig, env_file: &Path) -> CliResult<Option<Credentials>> {
    let fallback = read_env_file(env_file)?;
    if !fallback.is_empty() {
        debug!(path = %env_file.display(), vars = fallback.len(), "dotenv file loaded");
    }
    Ok(Credentials::from_env_or(&suite.credentials, &fallback).ok())
}

/// Runs feature files against a browser
#[derive(Debug)]
pub struct SuiteRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a new suite runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Reporter used for console output
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Check, run and report; fails when any scenario failed
    pub fn run(
        &mut self,
        suite: SuiteConfig,
        features: &[Feature],
        args: &RunArgs,
    ) -> CliResult<Vec<FeatureReport>> {
        let issues = check_features(features, &self.reporter)?;
        if issues > 0 {
            return Err(CliError::InvalidFeatures { count: issues });
        }

        let credentials = load_credentials(&suite, &args.env_file)?;
        if credentials.is_none() {
            self.reporter.warning(&format!(
                "credentials not set (${} / ${}); login steps will fail",
                suite.credentials.user_var, suite.credentials.password_var
            ));
        }

        let start = Instant::now();
        self.reporter.start_progress(features.len() as u64, "starting");
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| CliError::config(format!("failed to start async runtime: {e}")))?;
        let verbose = self.config.verbosity.is_verbose();
        let reports = rt.block_on(execute(
            &self.reporter,
            suite,
            credentials,
            features,
            args,
            verbose,
        ))?;
        self.reporter.finish();

        let passed: usize = reports.iter().map(FeatureReport::passed_count).sum();
        let failed: usize = reports.iter().map(FeatureReport::failed_count).sum();

        let written = write_reports(&args.output, &reports)?;
        info!(path = %written.display(), "reports written");
        if OutputFormat::from(args.format) == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            self.reporter.summary(passed, failed, start.elapsed());
            self.reporter.info(&format!("report: {}", written.display()));
        }

        if failed > 0 {
            return Err(CliError::ScenariosFailed {
                failed,
                total: passed + failed,
            });
        }
        Ok(reports)
    }
}

#[cfg(feature = "browser")]
async fn execute(
    reporter: &ProgressReporter,
    suite: SuiteConfig,
    credentials: Option<Credentials>,
    features: &[Feature],
    args: &RunArgs,
    verbose: bool,
) -> CliResult<Vec<FeatureReport>> {
    use paysync::scenario::ScenarioRunner;
    use paysync::ChromiumLauncher;

    let launcher = ChromiumLauncher::new(suite.browser.clone());
    let mut runner = ScenarioRunner::new(launcher, suite)?
        .with_artifacts_dir(args.output.join("screenshots"))
        .with_fail_fast(args.fail_fast);
    if let Some(credentials) = credentials {
        runner = runner.with_credentials(credentials);
    }
    if let Some(ref tag) = args.tag {
        runner = runner.with_tag(tag.clone());
    }

    let mut reports = Vec::with_capacity(features.len());
    for feature in features {
        reporter.set_message(&feature.feature);
        reporter.header(&feature.feature);
        let report = runner.run_feature(feature).await;
        for scenario in &report.scenarios {
            reporter.scenario(scenario, verbose);
        }
        reporter.increment(1);
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(not(feature = "browser"))]
#[allow(clippy::unused_async)]
async fn execute(
    _reporter: &ProgressReporter,
    _suite: SuiteConfig,
    _credentials: Option<Credentials>,
    _features: &[Feature],
    _args: &RunArgs,
    _verbose: bool,
) -> CliResult<Vec<FeatureReport>> {
    Err(CliError::config(
        "browser support not enabled. Rebuild with --features browser",
    ))
}

/// Write all feature reports of one run to `<output>/reports/<run_id>.json`
pub fn write_reports(output: &Path, reports: &[FeatureReport]) -> CliResult<PathBuf> {
    let dir = output.join("reports");
    std::fs::create_dir_all(&dir)?;
    let name = reports
        .first()
        .map_or_else(|| "empty".to_string(), |r| r.run_id.to_string());
    let path = dir.join(format!("{name}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(reports)?)?;
    Ok(path)
}
