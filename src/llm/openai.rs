use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sse::{completion_events, ErrorPayload};
use super::{ChatMessage, CompletionProvider, CompletionStream, UpstreamError};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorPayload,
}

/// Client for any endpoint speaking the OpenAI chat-completions protocol
/// (OpenRouter, Gemini's OpenAI layer, ...).
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: &str, api_key: &str, connect_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        debug!("Calling {} (model {model}, stream {stream})", self.endpoint());
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest { model, messages, stream })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Upstream {} answered {status}: {body}", self.base_url);
        Err(error_from_body(status.as_u16(), &body))
    }
}

/// Builds an error from a non-2xx response. The HTTP status wins over any
/// code found in the body.
fn error_from_body(status: u16, body: &str) -> UpstreamError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => UpstreamError::new(Some(status), parsed.error.message.unwrap_or_default()),
        Err(_) => UpstreamError::new(Some(status), String::new()),
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleClient {
    async fn complete(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, UpstreamError> {
        let response = self.send(model, &messages, false).await?;
        let body: CompletionResponse = response.json().await?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }

    async fn stream(&self, model: &str, messages: Vec<ChatMessage>) -> Result<CompletionStream, UpstreamError> {
        let response = self.send(model, &messages, true).await?;
        Ok(completion_events(response.bytes_stream()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_chat_completions_shape() {
        let messages = vec![ChatMessage::system("be nice"), ChatMessage::user("hi")];
        let body = serde_json::to_value(CompletionRequest {
            model: "gpt-test",
            messages: &messages,
            stream: true,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-test",
                "messages": [
                    { "role": "system", "content": "be nice" },
                    { "role": "user", "content": "hi" }
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn error_body_message_is_kept_with_http_status() {
        let err = error_from_body(402, r#"{"error":{"code":402,"message":"Insufficient credits"}}"#);
        assert_eq!(err, UpstreamError::new(Some(402), "Insufficient credits"));

        let err = error_from_body(429, r#"{"error":{"code":"rate_limit_exceeded","message":"slow"}}"#);
        assert_eq!(err.status, Some(429));
    }

    #[test]
    fn unparseable_error_body_keeps_status_only() {
        let err = error_from_body(503, "<html>busy</html>");
        assert_eq!(err, UpstreamError::new(Some(503), ""));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = OpenAiCompatibleClient::new(
            "https://generativelanguage.googleapis.com/v1beta/openai/",
            "key",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn completion_response_reads_first_choice() {
        let body: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Greeting"}}]}"#,
        )
        .unwrap();
        let text = body.choices.into_iter().next().and_then(|c| c.message).and_then(|m| m.content);
        assert_eq!(text.as_deref(), Some("Greeting"));
    }
}
