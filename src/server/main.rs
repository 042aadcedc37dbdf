use std::net::SocketAddr;

use keybeat::config::get_config;
use keybeat::errors::{KeybeatError, KeybeatResult};
use keybeat::server::database::Database;
use keybeat::server::handlers::{bootstrap_storage, AppState};
use keybeat::server::routes::build_router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> KeybeatResult<()> {
    let config = get_config()?;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::connect(&config.storage).await?;
    db.migrate().await?;
    info!("Using {} storage backend", db.backend_name());

    let admin_token = config.admin.secret();
    if admin_token.is_none() {
        warn!("No admin token configured; admin endpoints will reject every request");
    }

    let state = AppState::new(db, admin_token);
    let (licenses, heartbeats) = bootstrap_storage(&state.repo).await?;
    info!("Loaded {licenses} licenses and {heartbeats} heartbeat records");

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| KeybeatError::ConfigError(format!("invalid server address: {e}")))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| KeybeatError::ServerError(format!("failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| KeybeatError::ServerError(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
