use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{AppState, JsonBody};
use crate::auth::AdminUser;
use crate::db::catalog_repository::NewCategory;
use crate::errors::AppError;
use crate::models::{ApiData, ApiMessage, CategoryWithModels};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddModelRequest {
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub model_slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCategoryRequest {
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub category_slug: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionUpdate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub questions: Vec<String>,
}

/// POST `/api/v1/admin/add-model`
pub async fn add_model_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    JsonBody(body): JsonBody<AddModelRequest>,
) -> Result<Json<ApiMessage>, AppError> {
    state
        .chat
        .add_model(&body.category_id, &body.model_name, &body.model_slug)
        .await?;
    Ok(Json(ApiMessage::new("Model added successfully")))
}

/// POST `/api/v1/admin/add-model-category`
pub async fn add_category_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    JsonBody(body): JsonBody<AddCategoryRequest>,
) -> Result<Json<ApiMessage>, AppError> {
    state
        .chat
        .add_category(NewCategory {
            name: body.category_name.trim(),
            slug: body.category_slug.trim(),
            api_key: &body.api_key,
            base_url: body.base_url.as_deref(),
        })
        .await?;
    Ok(Json(ApiMessage::new("Category added successfully")))
}

/// DELETE `/api/v1/admin/delete-model/{model_id}`
pub async fn delete_model_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(model_id): Path<String>,
) -> Result<Json<ApiMessage>, AppError> {
    state.chat.delete_model(&model_id).await?;
    Ok(Json(ApiMessage::new("Model deleted successfully")))
}

/// DELETE `/api/v1/admin/delete-model-category/{category_id}`
pub async fn delete_category_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(category_id): Path<String>,
) -> Result<Json<ApiMessage>, AppError> {
    state.chat.delete_category(&category_id).await?;
    Ok(Json(ApiMessage::new("Category deleted successfully")))
}

/// GET `/api/v1/admin/get-models`. Every category and model, inactive included.
pub async fn get_models_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiData<Vec<CategoryWithModels>>>, AppError> {
    let categories = state.chat.get_models(true).await?;
    Ok(Json(ApiData::new(categories)))
}

/// PUT `/api/v1/admin/update-suggestions-questions`
pub async fn update_suggestions_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    JsonBody(body): JsonBody<Vec<SuggestionUpdate>>,
) -> Result<Json<ApiMessage>, AppError> {
    let updates: Vec<(String, Vec<String>)> =
        body.into_iter().map(|u| (u.id, u.questions)).collect();
    state.chat.update_suggestions(&updates).await?;
    Ok(Json(ApiMessage::new("Questions updated successfully")))
}
