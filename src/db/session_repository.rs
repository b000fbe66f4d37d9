use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::error;

use super::{SessionStore, SessionUser};
use crate::errors::AppError;

/// Read-only view of the sessions written by the external auth service.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn find_user_by_token(&self, token: &str) -> Result<Option<SessionUser>, AppError> {
        let row = sqlx::query(
            r#"SELECT u.id, u.role
               FROM session s
               JOIN "user" u ON u.id = s.user_id
               WHERE s.token = $1 AND s.expires_at > NOW()"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to look up session: {e}");
            AppError::db_query("Failed to look up session", e)
        })?;

        row.map(|row| {
            Ok(SessionUser {
                id: row.try_get("id").map_err(|e| AppError::db_query("Failed to read user id", e))?,
                role: row.try_get("role").map_err(|e| AppError::db_query("Failed to read user role", e))?,
            })
        })
        .transpose()
    }
}
