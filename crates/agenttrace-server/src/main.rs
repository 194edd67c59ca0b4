use std::sync::Arc;

use agenttrace_config::{Config, LogConfig, LogFormat};
use agenttrace_core::{TiktokenTokenizer, TokenAccountant};
use agenttrace_monitor::SqliteTraceStore;
use agenttrace_server::{build_router, ServerState};
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log);

    let pricing = config.pricing_table()?;
    info!(
        env = %config.env,
        models = pricing.len(),
        source = config.pricing_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "builtin".into()),
        "Loaded pricing table"
    );
    let accountant = TokenAccountant::new(Arc::new(pricing), Arc::new(TiktokenTokenizer::new()));

    let store = SqliteTraceStore::open(&config.db_path)
        .with_context(|| format!("failed to open trace store at {}", config.db_path.display()))?;

    let state = Arc::new(ServerState::new(accountant, Arc::new(store), config.request_timeout()));
    let app = build_router(state);

    let addr = config.listen_addr()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    match log.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
