//! `datacached` — the datacache daemon entrypoint.
//!
//! Wires together configuration, the lifecycle guard, the loader worker,
//! the cache coordinator, and the request server, then drives the
//! start-up/shutdown sequence.

use clap::Parser;
use datacache::server::serve;
use datacache::LifecycleGuard;
use datacache_common::config::{ConfigLoader, DaemonConfig};
use datacache_core::loader::RawBytesDecoder;
use datacache_core::CacheCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::sync_channel;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Bounded FIFO capacity for the loader's job queue.
const LOADER_QUEUE_BOUND: usize = 256;

/// How long shutdown waits for the loader thread to drain before giving up.
const LOADER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "datacached", about = "Shared-memory dataset cache daemon")]
struct Cli {
    /// Path to the TOML configuration file. Missing file falls back to
    /// built-in defaults.
    #[arg(short, long, default_value = "datacache.toml")]
    config: PathBuf,
}

fn load_config(path: &PathBuf) -> DaemonConfig {
    match DaemonConfig::load(path) {
        Ok(config) => config,
        Err(datacache_common::config::ConfigError::FileNotFound { .. }) => {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            DaemonConfig::default()
        }
        Err(e) => {
            eprintln!("failed to parse configuration at {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let config = load_config(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.as_filter_str()))
        .with_target(false)
        .init();

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        return std::process::ExitCode::FAILURE;
    }

    let guard = match LifecycleGuard::acquire(&config.lock_file_path) {
        Ok(guard) => guard,
        Err(e) => {
            tracing::error!(error = %e, "another instance is already running");
            return std::process::ExitCode::FAILURE;
        }
    };

    tracing::info!(
        cache_capacity_bytes = config.cache_capacity_bytes(),
        data_path = %config.data_path.display(),
        listen_addr = %config.listen_addr(),
        "starting datacache daemon"
    );

    // The coordinator needs the loader's job-queue sender at construction
    // time, and the loader needs a handle to the coordinator to publish
    // into — built via a channel created up front and handed to both sides.
    let (job_sender, job_receiver) = sync_channel(LOADER_QUEUE_BOUND);
    let coordinator = Arc::new(CacheCoordinator::new(
        config.cache_capacity_bytes(),
        config.data_path.clone(),
        config.dataset_extension.clone(),
        job_sender,
    ));

    let loader_handle = datacache_core::loader::spawn_with_receiver(
        Arc::clone(&coordinator),
        job_receiver,
        config.data_path.clone(),
        config.dataset_extension.clone(),
        Arc::new(RawBytesDecoder),
    );

    let serve_result = serve(
        &config.listen_addr(),
        Arc::clone(&coordinator),
        config.worker_pool_size,
        wait_for_shutdown_signal(),
    )
    .await;

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "failed to bind listening socket");
        guard.release();
        return std::process::ExitCode::FAILURE;
    }

    tracing::info!("shutting down: stopping loader");
    loader_handle.shutdown(LOADER_SHUTDOWN_TIMEOUT);

    tracing::info!("shutting down: unlinking resident segments");
    coordinator.shutdown();

    guard.release();
    tracing::info!("shutdown complete");
    std::process::ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
