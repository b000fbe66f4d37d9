pub mod admin_routes;
pub mod chat_routes;

use std::sync::Arc;

use axum::extract::{FromRequest, Request};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;

use crate::db::SessionStore;
use crate::errors::AppError;
use crate::service::chat_service::ChatService;
use crate::service::relay::ChatRelay;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub relay: ChatRelay,
    pub sessions: Arc<dyn SessionStore>,
}

/// JSON body whose rejections use the application's error envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Chat
        .route("/api/v1/chat", post(chat_routes::stream_chat_handler))
        .route("/api/v1/chat/new", post(chat_routes::new_conversation_handler))
        .route("/api/v1/chat/get-threads", get(chat_routes::get_threads_handler))
        .route("/api/v1/chat/search-threads", get(chat_routes::search_threads_handler))
        .route("/api/v1/chat/get-messages", get(chat_routes::get_messages_handler))
        .route(
            "/api/v1/chat/delete-conversation",
            delete(chat_routes::delete_conversation_handler),
        )
        .route("/api/v1/chat/get-models", get(chat_routes::get_models_handler))
        .route("/api/v1/get-suggestions-questions", get(chat_routes::get_suggestions_handler))
        // Admin
        .route("/api/v1/admin/add-model", post(admin_routes::add_model_handler))
        .route("/api/v1/admin/add-model-category", post(admin_routes::add_category_handler))
        .route(
            "/api/v1/admin/delete-model/{model_id}",
            delete(admin_routes::delete_model_handler),
        )
        .route(
            "/api/v1/admin/delete-model-category/{category_id}",
            delete(admin_routes::delete_category_handler),
        )
        .route("/api/v1/admin/get-models", get(admin_routes::get_models_handler))
        .route(
            "/api/v1/admin/update-suggestions-questions",
            put(admin_routes::update_suggestions_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    use crate::db::catalog_repository::CatalogRepository;
    use crate::llm::{CompletionEvent, UpstreamError};
    use crate::service::testing::{
        lazy_pool, CallLog, MemoryConversations, MemoryMessages, MemorySessions, ScriptedProvider,
    };

    struct TestApp {
        router: Router,
        conversations: Arc<MemoryConversations>,
        messages: Arc<MemoryMessages>,
        log: CallLog,
    }

    fn app(script: Vec<Result<CompletionEvent, UpstreamError>>, role: Option<&str>) -> TestApp {
        let conversations = Arc::new(MemoryConversations::default());
        let messages = Arc::new(MemoryMessages::default());
        let log = CallLog::default();
        let relay = ChatRelay::new(
            conversations.clone(),
            messages.clone(),
            Arc::new(ScriptedProvider::new(log.clone()).with_stream(script)),
            Arc::new(ScriptedProvider::new(log.clone()).with_title("Greeting")),
            "title-model",
        );
        let chat = ChatService::new(
            conversations.clone(),
            messages.clone(),
            CatalogRepository::new(lazy_pool()),
        );
        let state = AppState {
            chat,
            relay,
            sessions: Arc::new(MemorySessions::with("tok", "u1", role)),
        };
        TestApp { router: router(state), conversations, messages, log }
    }

    fn chat_body(conversation_id: &str, prompt: &str) -> String {
        serde_json::json!({
            "model": { "id": "m1", "name": "GPT Test", "slug": "gpt-test",
                       "isDefault": false, "isActive": true, "isPremium": false, "categoryId": null },
            "preferences": "",
            "messages": [],
            "conversationId": conversation_id,
            "prompt": prompt,
            "newConversation": true
        })
        .to_string()
    }

    fn post_chat(body: String, token: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::post("/api/v1/chat")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn deltas(parts: &[&str]) -> Vec<Result<CompletionEvent, UpstreamError>> {
        parts.iter().map(|p| Ok(CompletionEvent::Delta(p.to_string()))).collect()
    }

    #[tokio::test]
    async fn chat_streams_frames_then_done() {
        let test = app(deltas(&["Hel", "lo!"]), None);
        let conversation_id = test.conversations.insert_for("u1");

        let response = test
            .router
            .clone()
            .oneshot(post_chat(chat_body(&conversation_id, "Say hi"), Some("tok")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        let text = body_text(response).await;
        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 3);

        let first: serde_json::Value =
            serde_json::from_str(frames[0].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(first["type"], "text");
        assert_eq!(first["message"], "Hel");
        assert!(first["time"].is_string());

        let second: serde_json::Value =
            serde_json::from_str(frames[1].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(second["message"], "lo!");
        assert_eq!(frames[2], "data: [DONE]");

        assert_eq!(test.conversations.title_of(&conversation_id).as_deref(), Some("Greeting"));
    }

    #[tokio::test]
    async fn chat_persists_the_turn_after_streaming() {
        let test = app(deltas(&["Hel", "lo!"]), None);
        let conversation_id = test.conversations.insert_for("u1");

        let response = test
            .router
            .clone()
            .oneshot(post_chat(chat_body(&conversation_id, "Say hi"), Some("tok")))
            .await
            .unwrap();
        body_text(response).await;

        // Persistence runs after the body closes.
        for _ in 0..100 {
            if test.messages.all().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let saved = test.messages.all();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].first_text(), "Hello!");
    }

    #[tokio::test]
    async fn chat_without_session_is_unauthorized() {
        let test = app(deltas(&["x"]), None);
        let conversation_id = test.conversations.insert_for("u1");

        let response = test
            .router
            .clone()
            .oneshot(post_chat(chat_body(&conversation_id, "hi"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = test
            .router
            .clone()
            .oneshot(post_chat(chat_body(&conversation_id, "hi"), Some("stale")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(test.log.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_chat_body_is_a_json_bad_request() {
        let test = app(deltas(&["x"]), None);

        let response = test
            .router
            .clone()
            .oneshot(post_chat(chat_body("", "hi"), Some("tok")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["name"], "BadRequestError");
        assert!(test.log.calls().is_empty());
    }

    #[tokio::test]
    async fn upstream_refusal_maps_to_status() {
        let test = app(vec![Err(UpstreamError::new(Some(429), "busy"))], None);
        let conversation_id = test.conversations.insert_for("u1");

        let response = test
            .router
            .clone()
            .oneshot(post_chat(chat_body(&conversation_id, "hi"), Some("tok")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn threads_are_listed_for_the_cookie_session() {
        let test = app(Vec::new(), None);
        test.conversations.insert_for("u1");
        test.conversations.insert_for("someone-else");

        let request = axum::http::Request::get("/api/v1/chat/get-threads?offset=0")
            .header(header::COOKIE, "better-auth.session_token=tok.signature")
            .body(Body::empty())
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_then_delete_conversation() {
        let test = app(Vec::new(), None);

        let request = axum::http::Request::post("/api/v1/chat/new")
            .header(header::AUTHORIZATION, "Bearer tok")
            .body(Body::empty())
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let id = value["data"]["id"].as_str().unwrap().to_string();

        let request = axum::http::Request::delete(format!("/api/v1/chat/delete-conversation?threadId={id}"))
            .header(header::AUTHORIZATION, "Bearer tok")
            .body(Body::empty())
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = axum::http::Request::delete(format!("/api/v1/chat/delete-conversation?threadId={id}"))
            .header(header::AUTHORIZATION, "Bearer tok")
            .body(Body::empty())
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_require_admin_role() {
        let test = app(Vec::new(), Some("user"));
        let request = axum::http::Request::post("/api/v1/admin/add-model")
            .header(header::AUTHORIZATION, "Bearer tok")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"categoryId":"c","modelName":"n","modelSlug":"s"}"#))
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_body_errors_use_the_error_envelope() {
        let test = app(Vec::new(), Some("admin"));
        let request = axum::http::Request::put("/api/v1/admin/update-suggestions-questions")
            .header(header::AUTHORIZATION, "Bearer tok")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("[]"))
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = axum::http::Request::put("/api/v1/admin/update-suggestions-questions")
            .header(header::AUTHORIZATION, "Bearer tok")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let response = test.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(value["error"]["name"], "BadRequestError");
    }
}
