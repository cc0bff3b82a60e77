use anyhow::Result;
use std::sync::Arc;

use homeservices_backend::{
    app, config, db, logging,
    realtime::RoomHub,
    repository::{InMemoryStore, PgStore, SharedStore},
    services::RedisRelay,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting home services backend"
    );

    let store: SharedStore = match &settings.database_url {
        Some(url) => {
            let pool = db::create_pool(url, settings.database_max_connections).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let hub = RoomHub::new(settings.ws_broadcast_capacity);
    let (hub, relay) = match &settings.redis_url {
        Some(url) => {
            let (relay, hub) =
                RedisRelay::start(url, settings.redis_events_channel.clone(), hub).await?;
            (hub, Some(relay))
        }
        None => {
            tracing::info!("REDIS_URL not set, realtime events stay on this instance");
            (hub, None)
        }
    };

    let state = app::AppState::new(store, settings.clone(), hub, relay);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
