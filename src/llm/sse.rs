use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use super::{CompletionEvent, UpstreamError};

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// `{"error": {...}}` body, used both in-band and on error responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl ErrorPayload {
    /// In-band errors carry the provider's HTTP status as a numeric `code`.
    fn into_upstream_error(self) -> UpstreamError {
        let status = self
            .code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok());
        UpstreamError::new(status, self.message.unwrap_or_default())
    }
}

enum Line {
    Skip,
    Done,
    Events(Vec<Result<CompletionEvent, UpstreamError>>),
}

fn parse_line(raw: &[u8]) -> Line {
    let Ok(text) = std::str::from_utf8(raw) else {
        if raw.trim_ascii_start().starts_with(b"data:") {
            return Line::Events(vec![Err(UpstreamError::new(
                Some(502),
                "Completion chunk is not valid UTF-8",
            ))]);
        }
        return Line::Skip;
    };
    let line = text.trim();
    // Blank separators, `:` comments and non-data fields carry no content.
    let Some(data) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Line::Done;
    }
    Line::Events(parse_data(data))
}

fn parse_data(data: &str) -> Vec<Result<CompletionEvent, UpstreamError>> {
    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => {
            return vec![Err(UpstreamError::new(
                Some(502),
                format!("Failed to parse completion chunk: {e}"),
            ))]
        }
    };

    if let Some(error) = payload.error {
        return vec![Err(error.into_upstream_error())];
    }

    let mut events = Vec::new();
    if let Some(choice) = payload.choices.into_iter().next() {
        if let Some(content) = choice.delta.and_then(|d| d.content) {
            events.push(Ok(CompletionEvent::Delta(content)));
        }
        if let Some(reason) = choice.finish_reason {
            events.push(Ok(CompletionEvent::Finish { reason }));
        }
    }
    events
}

/// Turns the raw body of an OpenAI-compatible streaming response into
/// completion events. The stream ends at `data: [DONE]` or at end of body,
/// and stops after the first error.
pub fn completion_events<S, B, E>(
    body: S,
) -> impl Stream<Item = Result<CompletionEvent, UpstreamError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<UpstreamError> + Send + 'static,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::with_capacity(8192);
        let mut terminated = false;

        'read: while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err::<CompletionEvent, UpstreamError>(e.into());
                    terminated = true;
                    break 'read;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                match parse_line(&line) {
                    Line::Skip => continue,
                    Line::Done => {
                        terminated = true;
                        break 'read;
                    }
                    Line::Events(events) => {
                        for event in events {
                            let failed = event.is_err();
                            yield event;
                            if failed {
                                terminated = true;
                                break 'read;
                            }
                        }
                    }
                }
            }
        }

        // A final line without a trailing newline.
        if !terminated && !buffer.is_empty() {
            if let Line::Events(events) = parse_line(&buffer) {
                for event in events {
                    yield event;
                }
            }
        }
    }
}
