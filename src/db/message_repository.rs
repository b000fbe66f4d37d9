use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::error;

use super::MessageStore;
use crate::errors::AppError;
use crate::models::{ContentPart, Message, MessageRole};

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn find_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query(
            "SELECT id, thread_id, role, model, parts, created_at
             FROM messages
             WHERE thread_id = $1
             ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch messages for conversation {conversation_id}: {e}");
            AppError::db_query(
                format!("Failed to fetch messages for conversation {conversation_id}"),
                e,
            )
        })?;

        rows.into_iter()
            .map(|row: sqlx::postgres::PgRow| {
                use sqlx::Row;
                let role_str: String = row.try_get("role")
                    .map_err(|e| AppError::db_query("Failed to read role", e))?;
                let role = MessageRole::try_from(role_str)
                    .map_err(|e| AppError::Internal(format!("Unknown message role: {e}")))?;
                let parts: Option<Json<Vec<ContentPart>>> = row.try_get("parts")
                    .map_err(|e| AppError::db_query("Failed to read parts", e))?;
                Ok(Message {
                    id: row.try_get("id")
                        .map_err(|e| AppError::db_query("Failed to read id", e))?,
                    conversation_id: row.try_get("thread_id")
                        .map_err(|e| AppError::db_query("Failed to read thread_id", e))?,
                    role,
                    model: row.try_get("model")
                        .map_err(|e| AppError::db_query("Failed to read model", e))?,
                    parts: parts.map(|Json(p)| p).unwrap_or_default(),
                    created_at: row.try_get("created_at")
                        .map_err(|e| AppError::db_query("Failed to read created_at", e))?,
                })
            })
            .collect()
    }

    async fn save(&self, message: &Message) -> Result<Message, AppError> {
        sqlx::query(
            "INSERT INTO messages (id, thread_id, role, model, parts, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.model)
        .bind(Json(&message.parts))
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save message {}: {e}", message.id);
            AppError::db_query("Failed to save message", e)
        })?;
        Ok(message.clone())
    }
}
