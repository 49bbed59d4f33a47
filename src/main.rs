//! arr-server — Adaptive Resilience Runtime server
//!
//! Hosts the in-process runtime services (rate limiting, component
//! vitality, threat detection, route optimization) behind a small HTTP
//! surface.
//!
//! # Usage
//!
//! ```bash
//! # Run with built-in defaults
//! cargo run --release
//!
//! # Run with an explicit config file
//! cargo run --release -- --config arr.toml
//! ```
//!
//! # Environment Variables
//!
//! - `ARR_CONFIG`: Path to a TOML config file
//! - `ARR_CORS_ORIGINS`: Comma-separated allowed CORS origins (dev only)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use arr_runtime::api::{create_app, RuntimeState};
use arr_runtime::config::RuntimeConfig;
use arr_runtime::supervisor::{RuntimeSupervisor, TaskName};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "arr-server")]
#[command(about = "Adaptive Resilience Runtime server")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to a TOML config file (takes precedence over ARR_CONFIG
    /// and ./arr.toml)
    #[arg(long)]
    config: Option<String>,
}

/// Components whose vitality is tracked from boot. Anything else is
/// registered lazily when errors are first reported against it.
const CORE_COMPONENTS: &[&str] = &[
    "http-server",
    "rate-limiter",
    "threat-detector",
    "route-optimizer",
];

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => RuntimeConfig::load_from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => RuntimeConfig::load().context("Failed to load configuration")?,
    };
    let server_addr = args
        .addr
        .unwrap_or_else(|| config.server.addr.clone());

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  ARR - Adaptive Resilience Runtime");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "  Limiter: {:.1} tokens/s, cap {} | Evolve interval: {}ms",
        config.limiter.regeneration_rate(),
        config.limiter.max_tokens,
        config.routing.evolve_interval_ms
    );

    let supervisor = RuntimeSupervisor::new(config);
    for component in CORE_COMPONENTS {
        supervisor.vitality().register(component);
    }

    let app = create_app(RuntimeState::from_supervisor(&supervisor));

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!("✓ HTTP server listening on {}", server_addr);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    supervisor.spawn_background_tasks(&mut task_set, cancel_token.clone());

    run_supervisor_loop(&mut task_set, cancel_token).await?;

    // Drain remaining tasks so nothing outlives shutdown.
    while task_set.join_next().await.is_some() {}
    info!("✓ ARR shutdown complete");
    Ok(())
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel everything on the
/// first failure.
async fn run_supervisor_loop(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
