mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use codegrade_common::config::{env, DEFAULT_API_ADDR};
use codegrade_engine::{EngineConfig, GradingPool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub struct AppState {
    pub pool: GradingPool,
    /// Result of the toolchain probe run at boot: version line or failure message
    pub toolchain: Result<String, String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Codegrade API booting...");

    let config = EngineConfig::load_default().context("Failed to load engine configuration")?;
    info!(
        compiler = %config.toolchain.compiler,
        compile_timeout_ms = config.compile_timeout_ms,
        execution_timeout_ms = config.execution_timeout_ms,
        max_concurrent = config.max_concurrent_evaluations,
        "Engine configured"
    );

    let pool = GradingPool::from_config(&config);

    // The API still starts without a toolchain; /evaluate answers InternalError
    // and /status reports unhealthy so callers fall back
    let toolchain = match pool.engine().probe().await {
        Ok(version) => {
            info!(toolchain = %version, "Toolchain available");
            Ok(version)
        }
        Err(e) => {
            warn!(error = %e, "Toolchain probe failed");
            Err(e.to_string())
        }
    };

    let state = Arc::new(AppState { pool, toolchain });
    let app = routes::routes().with_state(state);

    let addr = std::env::var(env::API_ADDR).unwrap_or_else(|_| DEFAULT_API_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Codegrade API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, finishing in-flight evaluations...");
}
