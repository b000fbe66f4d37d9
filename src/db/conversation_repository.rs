use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::error;

use super::ConversationStore;
use crate::errors::AppError;
use crate::models::Conversation;

const COLUMNS: &str = "id, user_id, title, is_deleted, created_at, updated_at";

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn create(&self, conversation: &Conversation) -> Result<Conversation, AppError> {
        sqlx::query(
            "INSERT INTO threads (id, user_id, title, is_deleted, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.is_deleted)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save conversation {}: {e}", conversation.id);
            AppError::db_query("Failed to save conversation", e)
        })?;
        Ok(conversation.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, AppError> {
        sqlx::query_as::<_, Conversation>(&format!("SELECT {COLUMNS} FROM threads WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to find conversation {id}: {e}");
                AppError::db_query(format!("Failed to find conversation {id}"), e)
            })
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, AppError> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {COLUMNS} FROM threads
             WHERE user_id = $1 AND is_deleted = FALSE
             ORDER BY updated_at DESC NULLS LAST, created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list conversations for user {user_id}: {e}");
            AppError::db_query("Failed to fetch conversations", e)
        })
    }

    async fn search_for_user(&self, user_id: &str, query: &str) -> Result<Vec<Conversation>, AppError> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {COLUMNS} FROM threads
             WHERE user_id = $1 AND is_deleted = FALSE AND title ILIKE $2
             ORDER BY updated_at DESC NULLS LAST, created_at DESC"
        ))
        .bind(user_id)
        .bind(format!("%{}%", escape_like(query)))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to search conversations for user {user_id}: {e}");
            AppError::db_query("Failed to search conversations", e)
        })
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE threads SET title = $1, updated_at = $2 WHERE id = $3")
            .bind(title)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update conversation title {id}: {e}");
                AppError::db_query("Failed to update conversation", e)
            })?;
        Ok(())
    }

    async fn update_timestamp(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE threads SET updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update conversation timestamp {id}: {e}");
                AppError::db_query("Failed to update conversation", e)
            })?;
        Ok(())
    }

    async fn soft_delete(&self, id: &str, user_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE threads SET is_deleted = TRUE, updated_at = $1
             WHERE id = $2 AND user_id = $3 AND is_deleted = FALSE",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to delete conversation {id}: {e}");
            AppError::db_query("Failed to delete conversation", e)
        })?;
        Ok(result.rows_affected() > 0)
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
