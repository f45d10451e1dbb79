use localpaste::config::Config;
use localpaste::constants::PASTE_EMOJI;
use localpaste::handlers::AppState;
use localpaste::server;
use localpaste::store::FsBlobStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "localpaste=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    config.validate()?;

    // Open (and create) the data directory before accepting anything
    let store = FsBlobStore::open(&config.data_dir)?;

    tracing::info!(
        "{} localpaste storing blobs in {} (names {}..{} chars, max {} bytes)",
        PASTE_EMOJI,
        store.base_path().display(),
        config.name_min_length,
        config.name_max_length,
        config.max_payload_size
    );

    let state = AppState::new(config, Arc::new(store))?;
    server::serve(state).await
}
