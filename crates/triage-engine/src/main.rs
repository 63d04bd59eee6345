//! triaged - Triage error and metrics engine daemon
//!
//! Runs the engine with periodic metric collection, validates configuration
//! and exports collected metrics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use triage_engine::{Engine, EngineConfig, SAMPLE_CONFIG};

#[derive(Parser)]
#[command(name = "triaged")]
#[command(about = "Triage error categorization, alerting and metrics engine")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "TRIAGED_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until interrupted
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/triaged/config.toml", env = "TRIAGED_CONFIG")]
        config: PathBuf,

        /// Seconds between status log lines
        #[arg(long, default_value_t = 300)]
        status_interval_secs: u64,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "triaged.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a config file and its rule file
    CheckConfig {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/triaged/config.toml", env = "TRIAGED_CONFIG")]
        config: PathBuf,
    },

    /// Run one collection cycle and print Prometheus text
    Export {
        /// Path to config file
        #[arg(short, long, default_value = "/etc/triaged/config.toml", env = "TRIAGED_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    match cli.command {
        Commands::Run {
            config,
            status_interval_secs,
        } => {
            run_engine(config, status_interval_secs).await?;
        }

        Commands::InitConfig { output, force } => {
            init_config(&output, force)?;
        }

        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }

        Commands::Export { config } => {
            export(&config).await?;
        }
    }

    Ok(())
}

/// Crates whose events are shown at `info` unless `RUST_LOG` says otherwise.
const LOG_TARGETS: [&str; 5] = [
    "triaged",
    "triage_engine",
    "triage_incidents",
    "triage_alerts",
    "triage_metrics",
];

fn log_filter() -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    Ok(filter)
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = log_filter()?;

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn run_engine(config_path: PathBuf, status_interval_secs: u64) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting triaged");

    let config = EngineConfig::from_file(&config_path)?;
    let engine = Engine::from_config(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = engine.start_scheduler(shutdown_rx);

    let mut status = tokio::time::interval(Duration::from_secs(status_interval_secs.max(1)));
    status.tick().await;

    loop {
        tokio::select! {
            _ = status.tick() => {
                let pruned = engine.prune();
                let s = engine.status();
                info!(
                    incidents = s.incidents.total_incidents,
                    occurrences = s.incidents.total_occurrences,
                    alerts = s.alerts.total,
                    delivered = s.alerts.delivered,
                    failed = s.alerts.failed,
                    suppressed = s.alerts.suppressed,
                    metrics = s.metrics,
                    pruned_incidents = pruned.incidents,
                    pruned_alerts = pruned.alerts,
                    "engine status"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!(error = %e, "scheduler task failed");
        }
    }
    Ok(())
}

fn init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, SAMPLE_CONFIG)?;
    println!("Wrote sample config to {}", output.display());
    Ok(())
}

fn check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = EngineConfig::from_file(config_path)?;
    let rules = config.load_rules()?;

    println!("Config OK: {}", config_path.display());
    println!("  environment: {}", config.environment);
    println!(
        "  rules:       {} categories ({})",
        rules.len(),
        config
            .rules_file
            .as_ref()
            .map_or_else(|| "built-in".to_string(), |p| p.display().to_string())
    );
    println!("  channels:    {}", config.channels.len());
    println!("  thresholds:  {}", config.thresholds.len());
    println!("  sources:     {}", config.scheduler.sources.join(", "));
    Ok(())
}

async fn export(config_path: &Path) -> anyhow::Result<()> {
    let config = EngineConfig::from_file(config_path)?;
    let engine = Engine::from_config(config)?;

    let report = engine.collect_once().await;
    if report.failed() > 0 {
        warn!(failed = report.failed(), "some metric sources failed");
    }
    print!("{}", engine.export_prometheus());
    Ok(())
}
