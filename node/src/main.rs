// Copyright (c) 2026 Sardis Team. MIT License.
// See LICENSE for details.

//! # Sardis Service Host
//!
//! Entry point for the `sardis-node` binary. Builds the services context
//! (ledger, policy store, risk engine, webhook manager, orchestrator),
//! spawns the webhook delivery worker, and serves the HTTP boundary.
//!
//! Subcommands:
//!
//! - `run`     — start the service host
//! - `version` — print build version information

mod api;
mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use sardis_core::Services;

use cli::{Commands, SardisNodeCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SardisNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Startup sequence:
/// 1. Initialize logging
/// 2. Build the services context
/// 3. Spawn the webhook delivery worker
/// 4. Serve the HTTP API
/// 5. Await shutdown and drain
async fn run_node(args: cli::RunArgs) -> Result<()> {
    if !cli::validate_log_level(&args.log_level) {
        anyhow::bail!("invalid log level: {}", args.log_level);
    }
    let log_filter = format!(
        "sardis_node={level},sardis_core={level},tower_http=debug",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&args.log_format));

    tracing::info!(
        listen_addr = %args.listen_addr,
        "starting sardis-node"
    );

    // --- Services context: built once, shared everywhere ---
    let services = Services::new();

    // --- Webhook delivery worker ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = {
        let webhooks = Arc::clone(&services.webhooks);
        tokio::spawn(async move { webhooks.run_worker(shutdown_rx).await })
    };

    // --- HTTP API ---
    let state = api::AppState {
        services: Arc::clone(&services),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", args.listen_addr))?;
    tracing::info!("API server listening on {}", args.listen_addr);

    tokio::select! {
        result = async { axum::serve(listener, router).await } => {
            if let Err(e) = result {
                tracing::error!("API server error: {e}");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining");
        }
    }

    // --- Graceful shutdown: stop the delivery worker ---
    let _ = shutdown_tx.send(true);
    let _ = worker.await;

    tracing::info!("sardis-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

fn print_version() {
    println!("sardis-node {}", env!("CARGO_PKG_VERSION"));
    println!("api       {}", sardis_core::config::API_VERSION);
    if let Some(commit) = option_env!("GIT_COMMIT") {
        println!("commit    {commit}");
    }
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
