use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use docsign_api::{router, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let config = Config::parse();

    let level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("docsign_api={}", level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!("Initializing DocSign API...");
    let state = Arc::new(AppState::new(config).await?);
    let app = router(state);

    info!("Starting DocSign API on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
