use std::sync::Arc;

use tracing::info;

use crate::db::catalog_repository::{CatalogRepository, NewCategory};
use crate::db::{ConversationStore, MessageStore};
use crate::errors::AppError;
use crate::models::{CategoryWithModels, Conversation, Message, SuggestionQuestions};

pub const THREADS_PAGE_SIZE: i64 = 20;

/// Conversation, message and catalog operations behind the JSON API.
#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    catalog: CatalogRepository,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        catalog: CatalogRepository,
    ) -> Self {
        Self { conversations, messages, catalog }
    }

    // ── Conversations ─────────────────────────────────────────────────────────

    pub async fn new_conversation(&self, user_id: &str) -> Result<Conversation, AppError> {
        let conversation = self.conversations.create(&Conversation::new(user_id)).await?;
        info!("Created conversation {} for user {user_id}", conversation.id);
        Ok(conversation)
    }

    /// `page` is zero-based.
    pub async fn get_conversations(&self, user_id: &str, page: i64) -> Result<Vec<Conversation>, AppError> {
        let offset = page
            .max(0)
            .checked_mul(THREADS_PAGE_SIZE)
            .ok_or_else(|| AppError::BadRequest(format!("Page {page} is out of range")))?;
        self.conversations
            .list_for_user(user_id, THREADS_PAGE_SIZE, offset)
            .await
    }

    pub async fn search_conversations(&self, user_id: &str, query: &str) -> Result<Vec<Conversation>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::empty_field("search"));
        }
        self.conversations.search_for_user(user_id, query).await
    }

    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<(), AppError> {
        if conversation_id.trim().is_empty() {
            return Err(AppError::empty_field("threadId"));
        }
        if !self.conversations.soft_delete(conversation_id, user_id).await? {
            return Err(AppError::not_found("Conversation", conversation_id));
        }
        info!("Deleted conversation {conversation_id}");
        Ok(())
    }

    pub async fn get_messages(&self, user_id: &str, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        if conversation_id.trim().is_empty() {
            return Err(AppError::empty_field("threadId"));
        }
        self.conversations
            .find_by_id(conversation_id)
            .await?
            .filter(|c| c.is_owned_by(user_id))
            .ok_or_else(|| AppError::not_found("Conversation", conversation_id))?;
        self.messages.find_by_conversation_id(conversation_id).await
    }

    // ── Catalog ───────────────────────────────────────────────────────────────

    pub async fn get_models(&self, include_inactive: bool) -> Result<Vec<CategoryWithModels>, AppError> {
        self.catalog.categories_with_models(!include_inactive).await
    }

    pub async fn add_model(&self, category_id: &str, name: &str, slug: &str) -> Result<String, AppError> {
        require("categoryId", category_id)?;
        require("modelName", name)?;
        require("modelSlug", slug)?;
        if !self.catalog.category_exists(category_id).await? {
            return Err(AppError::BadRequest("Category not found".to_string()));
        }
        let id = self.catalog.insert_model(category_id, name.trim(), slug.trim()).await?;
        info!("Added model {slug} ({id}) to category {category_id}");
        Ok(id)
    }

    pub async fn add_category(&self, category: NewCategory<'_>) -> Result<String, AppError> {
        require("categoryName", category.name)?;
        require("categorySlug", category.slug)?;
        let slug = category.slug.to_string();
        let id = self.catalog.insert_category(category).await?;
        info!("Added model category {slug} ({id})");
        Ok(id)
    }

    pub async fn delete_model(&self, model_id: &str) -> Result<(), AppError> {
        require("modelId", model_id)?;
        self.catalog.delete_model(model_id).await
    }

    pub async fn delete_category(&self, category_id: &str) -> Result<(), AppError> {
        require("categoryId", category_id)?;
        self.catalog.delete_category(category_id).await
    }

    pub async fn get_suggestions(&self) -> Result<Vec<SuggestionQuestions>, AppError> {
        self.catalog.suggestion_questions().await
    }

    /// Every update is validated before any of them is written.
    pub async fn update_suggestions(&self, updates: &[(String, Vec<String>)]) -> Result<(), AppError> {
        validate_suggestion_updates(updates)?;
        for (id, questions) in updates {
            self.catalog.update_suggestion_questions(id, questions).await?;
        }
        Ok(())
    }
}

fn require(field_name: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::empty_field(field_name));
    }
    Ok(())
}

fn validate_suggestion_updates(updates: &[(String, Vec<String>)]) -> Result<(), AppError> {
    if updates.is_empty() {
        return Err(AppError::BadRequest("Data is required and must be an array".to_string()));
    }
    if updates.iter().any(|(id, questions)| id.trim().is_empty() || questions.is_empty()) {
        return Err(AppError::BadRequest(
            "Each item must have an id and questions array".to_string(),
        ));
    }
    Ok(())
}
