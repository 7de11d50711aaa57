//! Rates Pipeline
//!
//! Fetches deposit and savings rates, loads them, runs the comparison and
//! emails subscribers when better offers appear.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use infra_store::PgProductStore;
use service_pipeline::config::{build_config, CliArgs as ConfigCliArgs};
use service_pipeline::prelude::*;
use service_pipeline::schedule::run_daily;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rates Pipeline - scheduled rate collection and notification
#[derive(Parser, Debug)]
#[command(name = "rates-pipeline")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RATES_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Run lock file
    #[arg(long, env = "RATES_LOCK_FILE", global = true)]
    lock_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Execute one pipeline run and exit
    Run,
    /// Trigger a run every day at the configured time
    Schedule,
    /// Load and validate configuration only
    CheckConfig,
    /// Create the products and subscribers tables if missing
    Migrate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl From<&Args> for ConfigCliArgs {
    fn from(args: &Args) -> Self {
        ConfigCliArgs {
            config_file: args.config.clone(),
            log_level: args.log_level.clone(),
            lock_file: args.lock_file.clone(),
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
    );
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

fn cancel_on_signal(flag: CancellationFlag) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_err() {
                    return;
                }
                tracing::warn!("Interrupt received; no further steps will start");
            }
            _ = terminate() => {
                tracing::warn!("SIGTERM received; no further steps will start");
            }
        }
        flag.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let config = build_config(&ConfigCliArgs::from(&args)).context("invalid configuration")?;

    init_tracing(config.log_level.as_filter_str(), args.log_format);
    tracing::info!("Rates Pipeline v{}", service_pipeline::VERSION);
    tracing::info!(
        api_base_url = %config.api_base_url,
        fin_groups = ?config.fin_groups,
        products_table = %config.products_table,
        subscribers_table = %config.subscribers_table,
        comparison_procedure = %config.comparison_procedure,
        gate_timeout_secs = config.gate_timeout_secs,
        gate_poke_interval_secs = config.gate_poke_interval_secs,
        lock_file = %config.lock_file.display(),
        "Configuration loaded"
    );

    match args.command {
        Command::CheckConfig => {
            let pipeline = Pipeline::from_config(&config).context("failed to wire pipeline")?;
            for (index, wave) in pipeline.describe().iter().enumerate() {
                tracing::info!(wave = index, steps = ?wave, "Pipeline wave");
            }
            println!("configuration OK");
            Ok(ExitCode::SUCCESS)
        }
        Command::Migrate => {
            let store = PgProductStore::connect_lazy(config.store_settings()?)
                .context("failed to configure product store")?;
            store.migrate().await.context("migration failed")?;
            println!("schema up to date");
            Ok(ExitCode::SUCCESS)
        }
        Command::Run => {
            let pipeline = Pipeline::from_config(&config).context("failed to wire pipeline")?;
            cancel_on_signal(pipeline.cancellation());

            let report = pipeline.run().await;
            report.log_summary();
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Schedule => {
            let pipeline = Pipeline::from_config(&config).context("failed to wire pipeline")?;
            let schedule = config.schedule()?;
            let shutdown = pipeline.cancellation();
            cancel_on_signal(shutdown.clone());

            let pipeline = &pipeline;
            run_daily(&schedule, &shutdown, move || async move {
                let report = pipeline.run().await;
                report.log_summary();
            })
            .await;
            tracing::info!("Scheduler stopped");
            Ok(ExitCode::SUCCESS)
        }
    }
}
