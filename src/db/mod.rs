pub mod catalog_repository;
pub mod conversation_repository;
pub mod message_repository;
pub mod session_repository;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{Conversation, Message};

/// Conversations (`threads`) as seen by the relay and the chat API.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, conversation: &Conversation) -> Result<Conversation, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Conversation>, AppError>;

    /// One page of the user's live conversations, most recently updated first.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, AppError>;

    async fn search_for_user(&self, user_id: &str, query: &str) -> Result<Vec<Conversation>, AppError>;

    async fn update_title(&self, id: &str, title: &str) -> Result<(), AppError>;

    async fn update_timestamp(&self, id: &str) -> Result<(), AppError>;

    /// Returns `false` when no live conversation of that user matched.
    async fn soft_delete(&self, id: &str, user_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn find_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<Message>, AppError>;

    async fn save(&self, message: &Message) -> Result<Message, AppError>;
}

/// The user behind a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub role: Option<String>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_user_by_token(&self, token: &str) -> Result<Option<SessionUser>, AppError>;
}
