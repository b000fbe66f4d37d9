pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

use crate::models::{ChatRequest, MessageRole};

pub use openai::OpenAiCompatibleClient;

const SYSTEM_ROLE: &str = "system";

/// A `{role, content}` pair as sent to an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: SYSTEM_ROLE, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User.as_str(), content: content.into() }
    }

    pub fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role: role.as_str(), content: content.into() }
    }
}

/// One event read from an upstream completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    Delta(String),
    Finish { reason: String },
}

pub type CompletionStream = BoxStream<'static, Result<CompletionEvent, UpstreamError>>;

/// Failure reported by, or while talking to, an upstream provider.
/// `status` is the provider's HTTP status when one is known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream error (status {status:?}): {message}")]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        let status = if err.is_timeout() {
            Some(408)
        } else if err.is_connect() {
            Some(502)
        } else {
            err.status().map(|s| s.as_u16())
        };
        UpstreamError::new(status, err.to_string())
    }
}

/// An OpenAI-compatible chat completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Non-streaming completion; returns the first choice's text.
    async fn complete(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, UpstreamError>;

    /// Streaming completion. An error status is reported here, before any
    /// event is produced.
    async fn stream(&self, model: &str, messages: Vec<ChatMessage>) -> Result<CompletionStream, UpstreamError>;
}

const TITLE_INSTRUCTION: &str = "You are a helpful assistant that can give a short title for the user's question. \
ONLY give the title (do not add the word title to it), no other text. \
NO COMMENTS, NO CONFIRMATION, NO EXPLANATION, NO THANK YOU, NO NOTHING.";

/// System instruction for the main completion, carrying the user's preferences.
pub fn system_prompt(preferences: &str) -> String {
    format!(
        "You are a helpful assistant that can answer the questions of the user.\n\n\
         User Preferences:\n  - {preferences}\n"
    )
}

/// Messages for the title side-call.
pub fn title_messages(prompt: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(TITLE_INSTRUCTION), ChatMessage::user(prompt)]
}

/// Messages for the main call: system instruction, prior turns, then the prompt.
pub fn conversation_messages(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 2);
    messages.push(ChatMessage::system(system_prompt(&request.preferences)));
    messages.extend(
        request
            .messages
            .iter()
            .map(|m| ChatMessage::with_role(m.role, m.text())),
    );
    messages.push(ChatMessage::user(request.prompt.as_str()));
    messages
}
