//! Upload Verifier - end-to-end checks for a multi-tenant upload API
//!
//! Exits 0 when every check passes and 1 otherwise.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use upload_verifier::config::{ConfigLoader, OnAuthFailure};
use upload_verifier::scenario::{self, ScenarioRunner};
use upload_verifier::{metrics, ScenarioReport};

/// Upload Verifier - fabricate, upload and verify files against a live API
#[derive(Parser, Debug)]
#[command(name = "upload-verifier")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "verifier.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Override the API base URL from the configuration
    #[arg(long)]
    base_url: Option<String>,

    /// What to do when an identity fails to log in
    #[arg(long, value_enum)]
    on_auth_failure: Option<OnAuthFailure>,

    /// Write Prometheus metrics to this file after the run
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Write the report as JSON to this file
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    // Logs go to stderr; stdout carries the report.
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    info!("Starting Upload Verifier v{}", upload_verifier::VERSION);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let config = ConfigLoader::load_with(&args.config, |config| {
        if let Some(base_url) = &args.base_url {
            config.api.base_url = base_url.clone();
        }
        if let Some(policy) = args.on_auth_failure {
            config.scenario.on_auth_failure = Some(policy);
        }
        if let Some(path) = &args.metrics_file {
            config.metrics.output_path = Some(path.clone());
        }
    })
    .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    info!(
        path = %args.config.display(),
        base_url = %config.api.base_url,
        identities = config.identities.len(),
        "Loaded configuration"
    );

    let metrics_path = config.metrics.output_path.clone();
    let runner = ScenarioRunner::new(config)?;
    let mut task = tokio::spawn(async move { runner.run().await });

    let outcome = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping run");
            task.abort();
            // Wait for the task to unwind so the staging area is dropped.
            let _ = task.await;
            export_metrics(metrics_path.as_deref());
            anyhow::bail!("run interrupted");
        }
    };

    let result = outcome.context("Scenario task failed")?;
    export_metrics(metrics_path.as_deref());
    let report = result?;

    print_report(&report)?;
    if let Some(path) = &args.report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    let passed = report.passed();
    if passed {
        info!(cases = report.cases.len(), "All checks passed");
    } else {
        warn!(failed = report.failed_cases(), "Verification failed");
    }
    Ok(passed)
}

fn print_report(report: &ScenarioReport) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    scenario::render(report, &mut out)?;
    Ok(())
}

fn export_metrics(path: Option<&std::path::Path>) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = metrics::write_textfile(path) {
        warn!(error = %e, "Failed to export metrics");
    }
}
