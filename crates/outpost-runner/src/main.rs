//! outpost-runner: connects to backends and runs their commands.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;

use outpost_runner::config::{self, ConfigFile, Overrides};
use outpost_runner::{RunnerDaemon, probe_host_metadata};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "outpost-runner",
    version,
    about = "Outbound-only runner daemon that executes commands for remote backends"
)]
struct Args {
    /// Path to config file.
    /// Defaults to ~/.config/outpost/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File of KEY=VALUE lines loaded into the environment.
    /// Defaults to ~/.config/outpost/env when present.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Backend URL (repeatable).
    #[arg(short, long = "backend")]
    backends: Vec<String>,

    /// Numeric runner id registered with the backend.
    #[arg(long)]
    runner_id: Option<u64>,

    /// Human-readable runner name.
    #[arg(long)]
    runner_name: Option<String>,

    /// Shared secret. Prefer OUTPOST_SECRET or the env file.
    #[arg(long)]
    secret: Option<String>,

    /// Granted capability (repeatable), e.g. exec.readonly, exec.full, docker.
    #[arg(long = "capability")]
    capabilities: Vec<String>,

    /// Seconds between heartbeats.
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            backends: self.backends.clone(),
            runner_id: self.runner_id,
            runner_name: self.runner_name.clone(),
            secret: self.secret.clone(),
            capabilities: self.capabilities.clone(),
            heartbeat_secs: self.heartbeat_secs,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // The environment must be populated before the runtime starts threads.
    match &args.env_file {
        Some(path) => {
            config::load_env_file(path)?;
        }
        None => {
            if let Some(path) = config::default_env_file().filter(|p| p.exists()) {
                config::load_env_file(&path)?;
            } else {
                debug!("No env file, skipping");
            }
        }
    }

    let mut config_file = ConfigFile::load(args.config.as_deref())?;
    config_file.apply_env()?;
    config_file.apply_overrides(args.overrides());
    let config = config_file.resolve().context("invalid configuration")?;

    let metadata = probe_host_metadata();
    info!(
        "Starting outpost-runner {} on {} ({}/{}, docker={})",
        metadata.version,
        metadata.hostname,
        metadata.platform,
        metadata.arch,
        metadata.docker_available
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        let daemon = RunnerDaemon::start(config, metadata)?;
        wait_for_shutdown_signal().await?;
        daemon.stop().await;
        Ok::<(), anyhow::Error>(())
    })
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for SIGINT")?;
            info!("Received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}
