//! Credence web server.
//!
//! Run with: cargo run -p credence-web

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use credence_web::config::Config;
use credence_web::router::build_router;
use credence_web::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    info!("credence listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
