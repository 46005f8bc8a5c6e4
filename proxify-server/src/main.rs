use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

use proxify_server::api::router;
use proxify_server::config::{Config, StoreBackend};
use proxify_server::{
    AppState, InMemoryRepository, LoggingIndexer, ReportRepository, SqliteRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Proxify moderation service");

    let config =
        Config::from_env().context("Failed to load configuration from environment variables")?;

    let repository: Arc<dyn ReportRepository> = match config.store_backend {
        StoreBackend::Sqlite => {
            let db_path = config.database_path();
            info!("Using state database: {}", db_path.display());
            Arc::new(
                SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?,
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; moderation state will be lost on restart");
            Arc::new(InMemoryRepository::new())
        }
    };

    info!(
        approval_threshold = config.quorum.approval_threshold,
        rejection_threshold = config.quorum.rejection_threshold,
        "Quorum policy"
    );

    let app_state = Arc::new(AppState::new(
        repository,
        Arc::new(LoggingIndexer),
        config.quorum,
    ));

    let app = router(app_state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
