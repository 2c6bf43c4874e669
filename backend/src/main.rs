use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod leads;
mod pagination;
mod services;
mod workflows;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationMeta, PaginationParams};

use leads::LeadRepository;
use services::{EmailService, EnrichmentService};
use workflows::{AutomationEngine, LiveDispatcher};

pub struct AppState {
    pub pool: sqlx::PgPool,
    pub repo: LeadRepository,
    pub engine: Arc<AutomationEngine>,
    pub enrichment: Arc<EnrichmentService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let pool = database::create_pool(&config.database_url).await?;

    database::migrate(&pool).await?;

    let repo = LeadRepository::new(pool.clone());

    let email = if config.smtp.is_configured() {
        match EmailService::new(&config.smtp) {
            Ok(service) => Some(service),
            Err(err) => {
                tracing::warn!("SMTP disabled, transport setup failed: {}", err);
                None
            }
        }
    } else {
        tracing::info!("SMTP not configured; email actions will fail their runs");
        None
    };

    let dispatcher = Arc::new(LiveDispatcher::new(
        repo.clone(),
        email,
        Duration::from_secs(config.webhook_timeout_secs),
    ));
    let engine = Arc::new(AutomationEngine::new(
        pool.clone(),
        repo.clone(),
        dispatcher,
    ));
    let enrichment = Arc::new(EnrichmentService::new(config.enrichment_url.clone()));

    let mut scheduler =
        jobs::JobScheduler::new(engine.clone(), config.delay_poll_interval_secs).await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState {
        pool,
        repo,
        engine,
        enrichment,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Leadflow API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/forms", handlers::submission_routes())
        .nest(
            "/api/v1/workspaces/:workspace_id/leads",
            handlers::lead_routes(),
        )
        .nest(
            "/api/v1/workspaces/:workspace_id/automations",
            handlers::automation_routes(),
        )
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    scheduler.shutdown().await?;
    Ok(())
}
