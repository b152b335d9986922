mod config;

use std::sync::Arc;

use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use warbler_api::AppStateInner;
use warbler_db::Database;

use crate::config::{Config, DatabaseLocation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warbler=debug,warbler_api=debug,warbler_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let db = match &config.database {
        DatabaseLocation::File(path) => Database::open(path)?,
        DatabaseLocation::Memory => Database::open_in_memory()?,
    };
    let templates = warbler_api::templates::load()?;

    let state = Arc::new(AppStateInner {
        db,
        templates,
        secret: config.secret_key.clone(),
    });

    let app = warbler_api::router(state)
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http());

    info!("Warbler listening on {}", config.addr);
    info!("Serving static files from {}", config.static_dir.display());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("No SIGTERM handler ({}), waiting for Ctrl+C only", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
