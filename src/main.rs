mod agent;
mod config;
mod errors;
mod models;
mod routes;
mod service;
mod store;

use std::sync::Arc;

use tracing::{error, info};

use crate::agent::GeminiImageClient;
use crate::config::AppConfig;
use crate::service::chat_service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_chat=debug,tower_http=debug".into()),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = AppConfig::from_env();
    if !config.is_configured() {
        // Keep serving: every generation request will fail with a config error.
        error!("API_KEY environment variable is not set.");
    }
    info!(model = %config.model, api_base = %config.api_base, "Using Gemini image model");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let generator = GeminiImageClient::new(&config);
    let chat_service = ChatService::new(Arc::new(generator));
    let app = routes::router(chat_service, config.max_upload_bytes);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
