//! CLI Entry Point for sensor-pipeline
//!
//! Provides command-line interface for:
//! - Running the sampling pipeline until Ctrl+C, a fatal error, or an optional deadline
//! - Checking a configuration file without starting anything
//!
//! # Usage
//!
//! Run with the default configuration:
//! ```bash
//! sensor-pipeline run
//! ```
//!
//! Run for one minute against a specific file:
//! ```bash
//! sensor-pipeline run --config config/bench.toml --duration 60
//! ```
//!
//! Print the effective configuration:
//! ```bash
//! sensor-pipeline check --config config/pipeline.toml
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_pipeline::config::{PipelineConfig, DEFAULT_CONFIG_PATH};
use sensor_pipeline::{logging, Pipeline};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sensor-pipeline")]
#[command(about = "Double-buffered sensor sampling pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start sampling, aggregating and reporting
    Run {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Load and validate a configuration, then print it
    Check {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, duration } => run(config, duration).await,
        Commands::Check { config } => check(config),
    }
}

fn load(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::load_from(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn check(path: PathBuf) -> Result<()> {
    let config = load(&path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    println!(
        "# buffer refill time {:?}, aggregator idle backoff {:?}",
        config.refill_time(),
        config.aggregator.idle_backoff
    );
    Ok(())
}

async fn run(path: PathBuf, duration: Option<u64>) -> Result<()> {
    let config = load(&path)?;
    logging::init_from_config(&config)?;

    info!(
        name = %config.application.name,
        config = %path.display(),
        period_ms = config.sampling.period.as_millis() as u64,
        capacity = config.sampling.buffer_capacity,
        "Starting sensor pipeline"
    );

    if !config.application.startup_delay.is_zero() {
        info!(delay = ?config.application.startup_delay, "Waiting before bring-up");
        tokio::time::sleep(config.application.startup_delay).await;
    }

    let mut handle = Pipeline::from_config(&config)?.spawn();

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        result = handle.join() => result.map_err(anyhow::Error::from),
        _ = deadline => {
            info!("Run duration elapsed");
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = &signal {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Interrupted");
            Ok(())
        }
    };

    let stats = handle.shutdown().await;
    info!(stats = %serde_json::to_string(&stats)?, "Final pipeline statistics");
    outcome
}
