//! Loreweave API server entry point.

use std::sync::Arc;

use loreweave_core::clock::SystemClock;
use loreweave_core::repository::EventRepository;
use loreweave_event_store::memory_event_repository::InMemoryEventRepository;
use loreweave_event_store::pg_event_repository::PgEventRepository;
use loreweave_session::application::narration::NarrationService;
use sqlx::postgres::PgPoolOptions;

use loreweave_api::config::ApiConfig;
use loreweave_api::error::AppError;
use loreweave_api::narrator::HttpNarrator;
use loreweave_api::state::AppState;
use loreweave_api::{build_router, telemetry};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ApiConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Loreweave API server");

    let event_repository: Arc<dyn EventRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            loreweave_event_store::MIGRATOR.run(&pool).await?;
            Arc::new(PgEventRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; session state will not survive a restart");
            Arc::new(InMemoryEventRepository::new())
        }
    };

    let narration = match &config.narrator_url {
        Some(url) => {
            let narrator = HttpNarrator::new(url, config.narration_timeout)?;
            tracing::info!(narrator = %narrator.endpoint(), "using HTTP narrator");
            NarrationService::new(Arc::new(narrator), config.narration_timeout)
        }
        None => {
            tracing::warn!("NARRATOR_URL not set; every round uses fallback narration");
            NarrationService::fallback_only()
        }
    };

    tracing::info!(
        timeout = ?narration.timeout(),
        "narration timeout configured"
    );

    let app_state = AppState::new(
        Arc::new(SystemClock),
        event_repository,
        narration,
        config.admin_token.clone(),
    );
    let app = build_router(app_state);

    tracing::info!("Listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app).await?;

    telemetry.shutdown();
    Ok(())
}
