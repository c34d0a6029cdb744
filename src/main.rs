//! Waiver Backend server binary.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use waiver_backend::config::Config;
use waiver_backend::db::{self, Repository};
use waiver_backend::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Waiver Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Unresolved merge fields: {:?}", config.unresolved_policy);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (WAIVER_API_PSK). Authentication is disabled!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let state = AppState {
        repo: Arc::new(Repository::new(pool)),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
