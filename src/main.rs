//! Access Key Sweeper - Standalone Binary
//!
//! Disables IAM access keys that are older than, or unused for longer than,
//! the configured number of days. Meant to be started by a scheduler.
//!
//! ## Usage
//!
//! ```bash
//! # One sweep, age policy at 90 days, report only
//! DRY_RUN_MODE=true DISABLE_KEYS_TOGGLE=true DISABLE_KEYS_DAYS=90 access-key-sweeper --once
//!
//! # Sweep every hour, JSON logs and report
//! DISABLE_UNUSED_ONLY_KEYS_TOGGLE=true access-key-sweeper --interval 3600 --json-logs --output json
//! ```

use std::sync::Arc;
use std::time::Duration;

use access_key_sweeper::{AwsIamClient, RunReport, SweepConfig, Sweeper};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::time::interval;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Access Key Sweeper - Disable stale IAM access keys
#[derive(Parser, Debug)]
#[command(name = "access-key-sweeper", version, about)]
struct Args {
    /// Run a single sweep and exit (default unless --interval is given)
    #[arg(long)]
    once: bool,

    /// Sweep every N seconds instead of exiting
    #[arg(long, env = "SWEEP_INTERVAL")]
    interval: Option<u64>,

    /// Report format written to stdout after each sweep
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report(report: &RunReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.json_logs);

    let config = SweepConfig::from_env();
    info!(dry_run = config.dry_run, "Starting Access Key Sweeper");

    let provider = AwsIamClient::from_env().context("Failed to initialize IAM client")?;
    let sweeper = Sweeper::new(Arc::new(provider));

    match args.interval.filter(|_| !args.once) {
        None => {
            let report = sweeper
                .run(&config)
                .await
                .context("Access key sweep aborted")?;
            print_report(&report, &args.output)?;
        }
        Some(secs) => {
            let mut ticker = interval(Duration::from_secs(secs.max(1)));

            loop {
                ticker.tick().await;

                match sweeper.run(&config).await {
                    Ok(report) => print_report(&report, &args.output)?,
                    Err(e) => error!(error = %e, "Sweep cycle failed"),
                }
            }
        }
    }

    Ok(())
}
