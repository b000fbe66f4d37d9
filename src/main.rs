mod auth;
mod config;
mod db;
mod errors;
mod llm;
mod models;
mod routes;
mod service;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::catalog_repository::CatalogRepository;
use crate::db::conversation_repository::ConversationRepository;
use crate::db::message_repository::MessageRepository;
use crate::db::session_repository::SessionRepository;
use crate::llm::OpenAiCompatibleClient;
use crate::routes::AppState;
use crate::service::chat_service::ChatService;
use crate::service::relay::ChatRelay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batchit_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Database ──────────────────────────────────────────────────────────────
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Database connection established and migrations applied");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let conversations = Arc::new(ConversationRepository::new(pool.clone()));
    let messages = Arc::new(MessageRepository::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool.clone()));
    let catalog = CatalogRepository::new(pool.clone());

    let chat_provider = Arc::new(OpenAiCompatibleClient::new(
        &config.chat_api.base_url,
        &config.chat_api.api_key,
        config.connect_timeout,
    )?);
    let title_provider = Arc::new(OpenAiCompatibleClient::new(
        &config.title_api.base_url,
        &config.title_api.api_key,
        config.connect_timeout,
    )?);

    let state = AppState {
        chat: ChatService::new(conversations.clone(), messages.clone(), catalog),
        relay: ChatRelay::new(
            conversations,
            messages,
            chat_provider,
            title_provider,
            config.title_model.clone(),
        ),
        sessions,
    };

    // ── Router ────────────────────────────────────────────────────────────────
    let app = routes::router(state).layer(cors_layer(&config.cors_origins));

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Credentialed CORS for the web client. Session cookies require an explicit
/// origin list rather than a wildcard.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true)
}
