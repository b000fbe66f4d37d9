use std::time::Duration;

use anyhow::{anyhow, Context};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CHAT_API_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TITLE_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_TITLE_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Server configuration, read from the process environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database: DatabaseConfig,
    pub chat_api: UpstreamConfig,
    pub title_api: UpstreamConfig,
    pub title_model: String,
    pub connect_timeout: Duration,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| anyhow!("{key} must be set (copy .env.example to .env)"))
        };

        let port = match var("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("PORT is not a valid port: {raw}"))?,
            None => DEFAULT_PORT,
        };
        let max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let connect_timeout_secs = match var("UPSTREAM_CONNECT_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("UPSTREAM_CONNECT_TIMEOUT_SECS is not a number: {raw}"))?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        Ok(AppConfig {
            port,
            database: DatabaseConfig { url: required("DATABASE_URL")?, max_connections },
            chat_api: UpstreamConfig {
                base_url: var("CHAT_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_CHAT_API_BASE_URL.to_string()),
                api_key: required("CHAT_API_KEY")?,
            },
            title_api: UpstreamConfig {
                base_url: var("TITLE_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_TITLE_API_BASE_URL.to_string()),
                api_key: required("TITLE_API_KEY")?,
            },
            title_model: var("TITLE_MODEL").unwrap_or_else(|| DEFAULT_TITLE_MODEL.to_string()),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            cors_origins,
        })
    }
}
