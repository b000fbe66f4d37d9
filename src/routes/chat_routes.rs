use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use super::AppState;
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{
    ApiData, ApiMessage, CategoryWithModels, ChatRequest, Conversation, Message, RelayFrame,
    SuggestionQuestions,
};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
pub struct ThreadsQuery {
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    #[serde(default)]
    pub thread_id: String,
}

/// POST `/api/v1/chat` streams one assistant turn as server-sent events.
/// Errors before the first upstream event come back as a JSON error instead.
pub async fn stream_chat_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let request = ChatRequest::from_json(&body)?;
    let handle = state.relay.start(&user.id, request).await?;
    Ok(Sse::new(handle.frames.map(into_event)))
}

fn into_event(frame: RelayFrame) -> Result<Event, axum::Error> {
    match frame {
        RelayFrame::Data(frame) => Event::default().json_data(frame),
        RelayFrame::Done => Ok(Event::default().data(DONE_SENTINEL)),
    }
}

/// POST `/api/v1/chat/new`
pub async fn new_conversation_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiData<Conversation>>, AppError> {
    let conversation = state.chat.new_conversation(&user.id).await?;
    Ok(Json(ApiData::new(conversation)))
}

/// GET `/api/v1/chat/get-threads?offset=N`, where `offset` is a page number
pub async fn get_threads_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ThreadsQuery>,
) -> Result<Json<ApiData<Vec<Conversation>>>, AppError> {
    let threads = state.chat.get_conversations(&user.id, query.offset).await?;
    Ok(Json(ApiData::new(threads)))
}

/// GET `/api/v1/chat/search-threads?search=q`
pub async fn search_threads_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiData<Vec<Conversation>>>, AppError> {
    let threads = state.chat.search_conversations(&user.id, &query.search).await?;
    Ok(Json(ApiData::new(threads)))
}

/// GET `/api/v1/chat/get-messages?threadId=id`
pub async fn get_messages_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ApiData<Vec<Message>>>, AppError> {
    let messages = state.chat.get_messages(&user.id, &query.thread_id).await?;
    Ok(Json(ApiData::new(messages)))
}

/// DELETE `/api/v1/chat/delete-conversation?threadId=id`
pub async fn delete_conversation_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ApiMessage>, AppError> {
    state.chat.delete_conversation(&user.id, &query.thread_id).await?;
    Ok(Json(ApiMessage::new("Conversation deleted successfully")))
}

/// GET `/api/v1/chat/get-models`: public catalog of active models
pub async fn get_models_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiData<Vec<CategoryWithModels>>>, AppError> {
    let categories = state.chat.get_models(false).await?;
    Ok(Json(ApiData::new(categories)))
}

/// GET `/api/v1/get-suggestions-questions`
pub async fn get_suggestions_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiData<Vec<SuggestionQuestions>>>, AppError> {
    let suggestions = state.chat.get_suggestions().await?;
    Ok(Json(ApiData::new(suggestions)))
}
