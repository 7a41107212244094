//! Scenario runner binary

use anyhow::Context;
use clap::{Parser, ValueEnum};
use distribution_ledger::{Config, Metrics, ReportSink, Scenario};
use std::path::PathBuf;

/// Replay a scripted scenario against the ledgers and print the report
#[derive(Debug, Parser)]
#[command(name = "ledger-scenario", version)]
struct Cli {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value_t = Scenario::Balances)]
    scenario: Scenario,

    /// TOML configuration file (defaults, then environment, otherwise)
    #[arg(short, long, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Print Prometheus metrics after the report
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting scenario runner"
    );

    let metrics = Metrics::new().context("creating metrics registry")?;
    let report = cli
        .scenario
        .run(&config, Some(&metrics))
        .with_context(|| format!("scenario {} failed", cli.scenario))?;

    match cli.format {
        Format::Table => println!("{}", report.render()),
        Format::Json => println!("{}", report.to_json()?),
    }

    if cli.metrics {
        println!("{}", metrics.gather_text()?);
    }

    tracing::info!(scenario = %cli.scenario, "Scenario complete");
    Ok(())
}
