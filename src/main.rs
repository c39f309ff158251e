// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
pub mod config;
mod kubernetes;
mod relay;
mod server;

use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use cli::Args;
use config::Config;
use kubernetes::{ApiServerDescriber, WatcherSource};
use relay::RelayRegistry;
use server::RelayServer;

/// Initialize logging to stderr and, optionally, rotating files
fn init_logging(verbose: bool, log_dir: Option<&Path>) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    let filter = if verbose { "kube_relay=debug" } else { "kube_relay=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NONE);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    let Some(log_dir) = log_dir else {
        registry.init();
        return;
    };

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        registry.init();
        return;
    }

    // Rotate daily or at 10MB, keeping 5 files
    let condition = RollingConditionBase::new()
        .daily()
        .max_size(10 * 1024 * 1024);

    let file_appender =
        match RollingFileAppenderBase::new(log_dir.join("kube-relay.log"), condition, 5) {
            Ok(appender) => appender,
            Err(e) => {
                eprintln!("Warning: Could not create log file: {}", e);
                registry.init();
                return;
            }
        };

    let (non_blocking, _guard) = file_appender.get_non_blocking_appender();
    // Leak the guard to keep the background writer alive
    std::mem::forget(_guard);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    registry.with(file_layer).init();
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.log_dir.as_deref());

    // Install rustls crypto provider (aws-lc-rs)
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = Config::from_args(&args)?;
    info!(
        resources = ?config.resources,
        capacity = config.capacity,
        "Starting kube-relay"
    );

    let client = kubernetes::connect(&config.cluster_settings()).await?;
    let describer = ApiServerDescriber::new(client.clone());
    let source = Arc::new(WatcherSource::new(client));

    let registry = Arc::new(
        RelayRegistry::start(&config.resources, &describer, source, config.capacity).await?,
    );

    // Serve regardless; unsynced resources answer 502 until they catch up
    let unready = registry.wait_ready(config.sync_timeout()).await;
    if !unready.is_empty() {
        let names: Vec<String> = unready.iter().map(|id| id.to_string()).collect();
        error!(
            resources = %names.join(", "),
            ready = registry.len() - unready.len(),
            "Serving before initial sync completed"
        );
    }

    RelayServer::new(config.port, config.bind.clone())
        .run(registry, shutdown_signal())
        .await
}
