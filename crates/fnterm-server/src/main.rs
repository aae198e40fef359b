//! Binary entrypoint for the fnterm HTTP server.
//!
//! Configuration comes from `FNTERM_*` environment variables, see
//! [`fnterm_server::config`]. Log filtering follows `RUST_LOG`.

use fnterm_server::config::ServerConfig;
use fnterm_server::router::build_router;
use fnterm_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.socket_addr();
    tracing::info!(
        functions = %config.functions_dir.display(),
        databases = %config.database_dir.display(),
        "loading server state"
    );

    let state = AppState::new(config)?;
    let app = build_router(state);

    tracing::info!("fnterm server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
