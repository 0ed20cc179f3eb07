//! PaySync CLI: run payment feature files in a real browser
//!
//! ## Usage
//!
//! ```bash
//! paysync check features/payments.yaml       # Validate steps, no browser
//! paysync run features/payments.yaml         # Run every scenario
//! paysync run features/*.yaml --tag smoke    # Only tagged scenarios
//! paysync config --defaults                  # Print the default settings
//! ```

use clap::Parser;
use paysync::tracing_support::init_tracing;
use paysync::SuiteConfig;
use paysync_cli::{
    check_features, load_features, load_suite_config, CheckArgs, Cli, CliConfig, CliError,
    CliResult, Commands, ConfigArgs, ProgressReporter, RunArgs, SuiteRunner, Verbosity,
};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(&config.log_settings());

    match cli.command {
        Commands::Run(ref args) => run_features(config, cli.config.as_deref(), args),
        Commands::Check(ref args) => run_check(&config, args),
        Commands::Config(ref args) => show_config(cli.config.as_deref(), args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.verbose, cli.quiet))
        .with_color(cli.color.into())
        .with_log_json(cli.log_json)
}

fn run_features(config: CliConfig, path: Option<&Path>, args: &RunArgs) -> CliResult<()> {
    let suite = load_suite_config(path, Some(args))?;
    let features = load_features(&args.features)?;
    let mut runner = SuiteRunner::new(config);
    runner.run(suite, &features, args)?;
    Ok(())
}

fn run_check(config: &CliConfig, args: &CheckArgs) -> CliResult<()> {
    let reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let features = load_features(&args.features)?;
    let count = check_features(&features, &reporter)?;
    if count > 0 {
        return Err(CliError::InvalidFeatures { count });
    }
    Ok(())
}

fn show_config(path: Option<&Path>, args: &ConfigArgs) -> CliResult<()> {
    let suite = if args.defaults {
        SuiteConfig::default()
    } else {
        load_suite_config(path, None)?
    };
    let yaml = serde_yaml_ng::to_string(&suite)
        .map_err(|e| CliError::config(format!("cannot render configuration: {e}")))?;
    print!("{yaml}");
    Ok(())
}
