use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::llm::UpstreamError;

/// Top-level application error.
/// Every variant maps to one HTTP status and one client-facing error name.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Database errors ──────────────────────────────────────────────────────
    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{entity_type} '{id}' not found")]
    RecordNotFound { entity_type: String, id: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("{0}")]
    BadRequest(String),

    // ── Access errors ────────────────────────────────────────────────────────
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    // ── Upstream provider errors ─────────────────────────────────────────────
    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    NoProviderAvailable(String),

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::RecordNotFound { entity_type: entity_type.into(), id: id.into() }
    }

    pub fn empty_field(field_name: impl Into<String>) -> Self {
        AppError::EmptyField { field_name: field_name.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::RecordNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. } | AppError::FieldTooLong { .. } | AppError::BadRequest(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::NoProviderAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error name reported to clients in the `error.name` field.
    pub fn name(&self) -> &'static str {
        match self {
            e if e.is_validation() => "BadRequestError",
            e if e.is_not_found() => "NotFoundError",
            AppError::Unauthorized(_) => "UnauthorizedError",
            AppError::PaymentRequired(_) => "PaymentRequiredError",
            AppError::Forbidden(_) => "ForbiddenError",
            AppError::Timeout(_) => "TimeoutError",
            AppError::RateLimited(_) => "RateLimitExceeded",
            AppError::UpstreamUnavailable(_) => "UpstreamUnavailableError",
            AppError::NoProviderAvailable(_) => "NoProviderAvailableError",
            _ => "InternalRequestError",
        }
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::DatabaseQueryFailed { .. } => "Database query failed".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        let or_default = |fallback: &str| {
            if err.message.trim().is_empty() {
                fallback.to_string()
            } else {
                err.message.clone()
            }
        };
        match err.status {
            Some(400) => AppError::BadRequest(or_default(
                "Bad Request (invalid or missing params, CORS)",
            )),
            Some(401) => AppError::Unauthorized(or_default(
                "Invalid credentials (OAuth session expired, disabled/invalid API key)",
            )),
            Some(402) => AppError::PaymentRequired(or_default(
                "Your account or API key has insufficient credits.",
            )),
            Some(403) => AppError::Forbidden(or_default(
                "Your chosen model requires moderation and your input was flagged",
            )),
            Some(408) => AppError::Timeout("Your request timed out".to_string()),
            Some(429) => AppError::RateLimited("You are being rate limited".to_string()),
            Some(502) => AppError::UpstreamUnavailable(
                "Your chosen model is down or we received an invalid response from it".to_string(),
            ),
            Some(503) => AppError::NoProviderAvailable(
                "There is no available model provider that meets your routing requirements"
                    .to_string(),
            ),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {status}: {self}");
        }
        let body = json!({
            "success": false,
            "error": {
                "name": self.name(),
                "message": self.client_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16, message: &str) -> AppError {
        AppError::from(UpstreamError::new(Some(status), message))
    }

    #[test]
    fn upstream_statuses_map_to_client_error_kinds() {
        assert_eq!(upstream(400, "").status(), StatusCode::BAD_REQUEST);
        assert_eq!(upstream(401, "").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(upstream(402, "").status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(upstream(403, "").status(), StatusCode::FORBIDDEN);
        assert_eq!(upstream(408, "").status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(upstream(429, "").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(upstream(502, "").status(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream(503, "").status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(upstream(500, "").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::from(UpstreamError::new(None, "socket closed")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_message_is_kept_when_present() {
        let err = upstream(402, "Key limit exceeded");
        assert_eq!(err.client_message(), "Key limit exceeded");

        let err = upstream(402, "  ");
        assert_eq!(err.client_message(), "Your account or API key has insufficient credits.");
    }

    #[test]
    fn rate_limit_uses_fixed_message() {
        let err = upstream(429, "provider said slow down");
        assert_eq!(err.client_message(), "You are being rate limited");
        assert_eq!(err.name(), "RateLimitExceeded");
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = AppError::empty_field("prompt");
        assert!(err.is_validation());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.name(), "BadRequestError");
        assert_eq!(err.client_message(), "Field 'prompt' cannot be empty");
    }

    #[test]
    fn internal_details_are_hidden_from_clients() {
        let err = AppError::Internal("pool exhausted".to_string());
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_response_uses_json_envelope() {
        let response = AppError::not_found("Conversation", "abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["name"], "NotFoundError");
        assert_eq!(value["error"]["message"], "Conversation 'abc' not found");
    }
}
