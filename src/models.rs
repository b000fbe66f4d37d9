use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

// ── Conversations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: Some(user_id.to_string()),
            title: Some(DEFAULT_CONVERSATION_TITLE.to_string()),
            is_deleted: false,
            created_at: now,
            updated_at: Some(now),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        !self.is_deleted && self.user_id.as_deref() == Some(user_id)
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// One typed piece of message content. Only text parts exist today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            ContentPart::Text { text } => text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub model: Option<String>,
    pub parts: Vec<ContentPart>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: &str, role: MessageRole, model: &str, text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            model: Some(model.to_string()),
            parts: vec![ContentPart::text(text)],
            created_at: Utc::now(),
        }
    }

    /// Builds the user/assistant pair for one turn. The assistant message is
    /// always stamped strictly after the user message.
    pub fn turn(conversation_id: &str, model: &str, prompt: String, reply: String) -> (Self, Self) {
        let user = Message::new(conversation_id, MessageRole::User, model, prompt);
        let mut assistant = Message::new(conversation_id, MessageRole::Assistant, model, reply);
        if assistant.created_at <= user.created_at {
            assistant.created_at = user.created_at + Duration::microseconds(1);
        }
        (user, assistant)
    }

    /// Text of the first part, or an empty string.
    pub fn first_text(&self) -> &str {
        self.parts.first().map(ContentPart::as_text).unwrap_or_default()
    }
}

// ── Model catalog ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub is_default: bool,
    pub is_active: bool,
    pub is_premium: bool,
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModelCategory {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithModels {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionQuestions {
    pub id: String,
    pub category: Option<String>,
    pub questions: Vec<String>,
}

// ── Chat relay request ────────────────────────────────────────────────────────

const MAX_PROMPT_LENGTH: usize = 32_000;

/// The model selected in the client. Only the slug reaches the upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelector {
    pub slug: String,
}

/// A prior turn as the client holds it.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub parts: Option<Vec<ContentPart>>,
}

impl HistoryMessage {
    pub fn text(&self) -> &str {
        self.parts
            .as_deref()
            .and_then(|parts| parts.first())
            .map(ContentPart::as_text)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub model: ModelSelector,
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub new_conversation: bool,
}

impl ChatRequest {
    /// Parses and validates a raw request body. Nothing is sent upstream for
    /// a body rejected here.
    pub fn from_json(body: &[u8]) -> Result<Self, AppError> {
        let request: ChatRequest = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Validation error: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.conversation_id.trim().is_empty() {
            return Err(AppError::empty_field("conversationId"));
        }
        if self.prompt.trim().is_empty() {
            return Err(AppError::empty_field("prompt"));
        }
        if self.prompt.len() > MAX_PROMPT_LENGTH {
            return Err(AppError::FieldTooLong {
                field_name: "prompt".to_string(),
                max_length: MAX_PROMPT_LENGTH,
                actual_length: self.prompt.len(),
            });
        }
        if self.model.slug.trim().is_empty() {
            return Err(AppError::empty_field("model.slug"));
        }
        Ok(())
    }
}

// ── Stream frames ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Text,
    Error,
}

/// Payload of one `data: ...` frame sent to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl StreamFrame {
    pub fn text(message: String) -> Self {
        Self::stamped(FrameKind::Text, message)
    }

    pub fn error(message: String) -> Self {
        Self::stamped(FrameKind::Error, message)
    }

    fn stamped(kind: FrameKind, message: String) -> Self {
        Self {
            kind,
            message: Some(message),
            time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Units handed from the relay task to the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Data(StreamFrame),
    Done,
}

// ── Response envelopes ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ApiData<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiData<T> {
    pub fn new(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }
}
