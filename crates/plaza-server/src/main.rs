use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use plaza_api::{AppStateInner, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    plaza_server::init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = config.addr.parse()?;

    let db = plaza_server::open_database(&config)?;
    let mailer = plaza_server::mailer(&config)?;

    let env = config.env.clone();
    let state = Arc::new(AppStateInner::new(config, db, mailer)?);
    let app = plaza_api::router(state);

    info!("Plaza server listening on {} ({})", addr, env);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Plaza server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
