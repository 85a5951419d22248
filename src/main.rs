use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use snapfeed::config::{Cli, Config};
use snapfeed::state::AppState;
use snapfeed::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    // The store is required; failing to reach it ends the process
    let db_path = config.db_path();
    let pool = db::create_pool(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db::run_migrations(&pool).context("failed to migrate database")?;
    tracing::info!("Database: {}", db_path.display());

    let state = AppState::new(pool, config.clone());
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
