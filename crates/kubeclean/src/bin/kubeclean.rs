/*
 * KubeClean - Rule-driven pod cleanup for Kubernetes
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! KubeClean Service - periodic, rule-driven pod cleanup
//!
//! This service:
//! - Loads cleanup rules from a mounted YAML file
//! - Deletes stale pods on a fixed interval, in batches
//! - Reloads the rules when the file changes
//! - Serves liveness and readiness probes

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kubeclean::{
    load_config_from_file, probe, ConfigWatcher, KubePodStore, PodCleanController, SharedConfig,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Rule-driven cleanup of stale Kubernetes pods
#[derive(Parser, Debug)]
#[command(name = "kubeclean")]
#[command(version)]
struct Cli {
    /// Path to the cleanup rules file
    #[arg(long, env = "KUBECLEAN_CONFIG", default_value = "/etc/kubeclean/config.yaml")]
    config: PathBuf,

    /// Time between cleanup runs (e.g. "1m", "30s")
    #[arg(long, env = "KUBECLEAN_INTERVAL", default_value = "1m", value_parser = parse_interval)]
    interval: Duration,

    /// Time between checks of the rules file for changes
    #[arg(long, env = "KUBECLEAN_CONFIG_POLL_INTERVAL", default_value = "10s", value_parser = parse_interval)]
    config_poll_interval: Duration,

    /// Upper bound on a single cleanup run
    #[arg(long, env = "KUBECLEAN_RUN_TIMEOUT", default_value = "10m", value_parser = parse_interval)]
    run_timeout: Duration,

    /// Address for the /healthz and /readyz endpoints
    #[arg(long, env = "KUBECLEAN_PROBE_ADDR", default_value = "0.0.0.0:8081")]
    probe_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "KUBECLEAN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Simulate deletions regardless of the dryRun setting in the rules file
    #[arg(long, env = "KUBECLEAN_DRY_RUN")]
    dry_run: bool,
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kubeclean=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting KubeClean v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config_from_file(&cli.config)
        .with_context(|| format!("Failed to load cleanup config from {}", cli.config.display()))?;
    info!(
        path = %cli.config.display(),
        rules = config.pod_cleanup_config.rules.len(),
        enabled = config.pod_cleanup_config.enabled,
        dry_run = config.dry_run || cli.dry_run,
        batch_size = config.batch_size,
        "Loaded cleanup configuration"
    );
    if cli.dry_run {
        warn!("Dry-run forced from the command line; no pods will be deleted");
    }

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let shared = SharedConfig::new(config);
    let store = Arc::new(KubePodStore::new(client));
    let controller =
        PodCleanController::new(store, shared.clone()).with_forced_dry_run(cli.dry_run);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let watcher = ConfigWatcher::new(&cli.config, shared.clone());
    let watcher_handle = tokio::spawn(watcher.run(cli.config_poll_interval, shutdown.clone()));

    let probe_handle = tokio::spawn({
        let shared = shared.clone();
        let shutdown = shutdown.clone();
        let addr = cli.probe_addr;
        async move {
            if let Err(e) = probe::serve(addr, shared, shutdown.clone()).await {
                error!("Probe server error: {}", e);
                shutdown.cancel();
            }
        }
    });

    controller
        .run_periodic(cli.interval, cli.run_timeout, shutdown.clone())
        .await;

    if let Err(e) = watcher_handle.await {
        error!("Config watcher task join error: {:?}", e);
    }
    if let Err(e) = probe_handle.await {
        error!("Probe server task join error: {:?}", e);
    }

    info!("KubeClean stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
