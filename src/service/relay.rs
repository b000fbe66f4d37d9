use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::db::{ConversationStore, MessageStore};
use crate::errors::AppError;
use crate::llm::{self, CompletionEvent, CompletionProvider, CompletionStream};
use crate::models::{ChatRequest, Message, RelayFrame, StreamFrame};

/// Frames buffered between the relay task and the response body. When full,
/// the relay stops reading upstream until the client catches up.
const RELAY_CHANNEL_CAPACITY: usize = 32;

const FALLBACK_TITLE_CHARS: usize = 60;

/// Bridges an upstream streaming completion to the client's event stream and
/// persists the finished turn.
#[derive(Clone)]
pub struct ChatRelay {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    chat_provider: Arc<dyn CompletionProvider>,
    title_provider: Arc<dyn CompletionProvider>,
    title_model: String,
}

/// A running relay. Dropping `frames` does not stop the relay; `completion`
/// resolves once the turn has been persisted (or abandoned).
pub struct RelayHandle {
    pub frames: ReceiverStream<RelayFrame>,
    pub completion: JoinHandle<()>,
}

struct Turn {
    conversation_id: String,
    model: String,
    prompt: String,
}

impl ChatRelay {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        chat_provider: Arc<dyn CompletionProvider>,
        title_provider: Arc<dyn CompletionProvider>,
        title_model: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            messages,
            chat_provider,
            title_provider,
            title_model: title_model.into(),
        }
    }

    /// Validates the request, derives the title on a first turn, opens the
    /// upstream stream and waits for its first event. Any failure up to that
    /// point is returned as an error and no frame is ever produced.
    pub async fn start(&self, user_id: &str, request: ChatRequest) -> Result<RelayHandle, AppError> {
        request.validate()?;

        let conversation = self
            .conversations
            .find_by_id(&request.conversation_id)
            .await?
            .filter(|c| c.is_owned_by(user_id))
            .ok_or_else(|| AppError::not_found("Conversation", &request.conversation_id))?;

        if request.new_conversation {
            self.derive_title(&conversation.id, &request.prompt).await?;
        }

        let model = request.model.slug.clone();
        let mut upstream = self
            .chat_provider
            .stream(&model, llm::conversation_messages(&request))
            .await
            .map_err(|e| {
                warn!("Upstream refused stream for conversation {}: {e}", conversation.id);
                AppError::from(e)
            })?;

        let first = upstream.next().await.transpose().map_err(|e| {
            warn!("Upstream stream for conversation {} failed before first event: {e}", conversation.id);
            AppError::from(e)
        })?;
        let events = stream::iter(first.map(Ok)).chain(upstream).boxed();

        info!("Relaying {model} completion for conversation {}", conversation.id);
        let turn = Turn {
            conversation_id: conversation.id,
            model,
            prompt: request.prompt,
        };
        let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        let completion = tokio::spawn(self.clone().forward(turn, events, tx));

        Ok(RelayHandle { frames: ReceiverStream::new(rx), completion })
    }

    /// A failed or empty title call falls back to the truncated prompt.
    async fn derive_title(&self, conversation_id: &str, prompt: &str) -> Result<(), AppError> {
        let title = match self
            .title_provider
            .complete(&self.title_model, llm::title_messages(prompt))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Title model returned no text for conversation {conversation_id}");
                fallback_title(prompt)
            }
            Err(e) => {
                warn!("Title generation failed for conversation {conversation_id}: {e}");
                fallback_title(prompt)
            }
        };
        self.conversations.update_title(conversation_id, &title).await?;
        debug!("Conversation {conversation_id} titled '{title}'");
        Ok(())
    }

    async fn forward(self, turn: Turn, mut events: CompletionStream, tx: mpsc::Sender<RelayFrame>) {
        let mut assembled = String::new();
        let mut client_connected = true;

        let outcome = loop {
            match events.next().await {
                None => break Ok(()),
                Some(Ok(CompletionEvent::Finish { reason })) => {
                    debug!("Upstream finished ({reason}) for conversation {}", turn.conversation_id);
                    break Ok(());
                }
                Some(Ok(CompletionEvent::Delta(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    assembled.push_str(&text);
                    send(&tx, RelayFrame::Data(StreamFrame::text(text)), &mut client_connected).await;
                }
                Some(Err(e)) => break Err(e),
            }
        };

        match outcome {
            Ok(()) => {
                send(&tx, RelayFrame::Done, &mut client_connected).await;
                drop(tx);
                self.persist(turn, assembled).await;
            }
            Err(e) => {
                error!(
                    "Upstream stream for conversation {} failed mid-stream, turn not saved: {e}",
                    turn.conversation_id
                );
                let frame = StreamFrame::error(AppError::from(e).client_message());
                send(&tx, RelayFrame::Data(frame), &mut client_connected).await;
                send(&tx, RelayFrame::Done, &mut client_connected).await;
            }
        }
    }

    async fn persist(&self, turn: Turn, reply: String) {
        let (user, assistant) = Message::turn(&turn.conversation_id, &turn.model, turn.prompt, reply);

        if let Err(e) = self.messages.save(&user).await {
            error!("Lost turn for conversation {}: user message not saved: {e}", turn.conversation_id);
            return;
        }
        if let Err(e) = self.messages.save(&assistant).await {
            error!("Lost assistant reply for conversation {}: {e}", turn.conversation_id);
            return;
        }
        if let Err(e) = self.conversations.update_timestamp(&turn.conversation_id).await {
            error!("Failed to update conversation timestamp: {e}");
        }
        debug!("Saved turn {} / {} for conversation {}", user.id, assistant.id, turn.conversation_id);
    }
}

/// Sends unless the client is already gone. A failed send marks it gone and
/// the relay keeps draining upstream.
async fn send(tx: &mpsc::Sender<RelayFrame>, frame: RelayFrame, client_connected: &mut bool) {
    if *client_connected && tx.send(frame).await.is_err() {
        *client_connected = false;
        debug!("Client disconnected, draining upstream");
    }
}

fn fallback_title(prompt: &str) -> String {
    let t = prompt.trim();
    if t.chars().count() > FALLBACK_TITLE_CHARS {
        format!("{}…", t.chars().take(FALLBACK_TITLE_CHARS).collect::<String>())
    } else {
        t.to_string()
    }
}
