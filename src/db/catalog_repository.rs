use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::error;

use crate::errors::AppError;
use crate::models::{CategoryWithModels, Model, ModelCategory, SuggestionQuestions};

/// Model catalog and suggestion questions. Read-only for the relay, edited
/// through the admin API.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

pub struct NewCategory<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub api_key: &'a str,
    pub base_url: Option<&'a str>,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Categories with their models. With `active_only`, inactive models are
    /// left out (categories are always listed).
    pub async fn categories_with_models(
        &self,
        active_only: bool,
    ) -> Result<Vec<CategoryWithModels>, AppError> {
        let categories = sqlx::query_as::<_, ModelCategory>(
            "SELECT id, name, slug, base_url FROM model_categories ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch model categories: {e}");
            AppError::db_query("Failed to fetch model categories", e)
        })?;

        let models = sqlx::query_as::<_, Model>(
            "SELECT id, name, slug, is_default, is_active, is_premium, category_id
             FROM models
             WHERE is_active OR NOT $1
             ORDER BY created_at ASC",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch models: {e}");
            AppError::db_query("Failed to fetch models", e)
        })?;

        Ok(group_models(categories, models))
    }

    pub async fn category_exists(&self, id: &str) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM model_categories WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to look up model category {id}: {e}");
                AppError::db_query("Failed to look up model category", e)
            })
    }

    pub async fn insert_model(&self, category_id: &str, name: &str, slug: &str) -> Result<String, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO models (id, name, slug, category_id, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&id)
        .bind(name)
        .bind(slug)
        .bind(category_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert model {slug}: {e}");
            AppError::db_query("Failed to insert model", e)
        })?;
        Ok(id)
    }

    pub async fn insert_category(&self, category: NewCategory<'_>) -> Result<String, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO model_categories (id, name, slug, api_key, base_url, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&id)
        .bind(category.name)
        .bind(category.slug)
        .bind(category.api_key)
        .bind(category.base_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert model category {}: {e}", category.slug);
            AppError::db_query("Failed to insert model category", e)
        })?;
        Ok(id)
    }

    pub async fn delete_model(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM models WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete model {id}: {e}");
                AppError::db_query("Failed to delete model", e)
            })?;
        Ok(())
    }

    /// Deletes a category and its models atomically.
    pub async fn delete_category(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to open transaction: {e}");
            AppError::db_query("Failed to open transaction", e)
        })?;

        sqlx::query("DELETE FROM models WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::db_query("Failed to delete category models", e))?;

        sqlx::query("DELETE FROM model_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::db_query("Failed to delete model category", e))?;

        tx.commit().await.map_err(|e| {
            error!("Failed to delete model category {id}: {e}");
            AppError::db_query("Failed to commit category deletion", e)
        })
    }

    pub async fn suggestion_questions(&self) -> Result<Vec<SuggestionQuestions>, AppError> {
        let rows = sqlx::query("SELECT id, category, questions FROM suggestion_questions ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch suggestion questions: {e}");
                AppError::db_query("Failed to fetch suggestion questions", e)
            })?;

        rows.into_iter()
            .map(|row| {
                let questions: Option<Json<Vec<String>>> = row.try_get("questions")
                    .map_err(|e| AppError::db_query("Failed to read questions", e))?;
                Ok(SuggestionQuestions {
                    id: row.try_get("id")
                        .map_err(|e| AppError::db_query("Failed to read id", e))?,
                    category: row.try_get("category")
                        .map_err(|e| AppError::db_query("Failed to read category", e))?,
                    questions: questions.map(|Json(q)| q).unwrap_or_default(),
                })
            })
            .collect()
    }

    pub async fn update_suggestion_questions(&self, id: &str, questions: &[String]) -> Result<(), AppError> {
        sqlx::query("UPDATE suggestion_questions SET questions = $1, updated_at = $2 WHERE id = $3")
            .bind(Json(questions))
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update suggestion questions {id}: {e}");
                AppError::db_query("Failed to update suggestion questions", e)
            })?;
        Ok(())
    }
}

fn group_models(categories: Vec<ModelCategory>, models: Vec<Model>) -> Vec<CategoryWithModels> {
    categories
        .into_iter()
        .map(|category| {
            let models = models
                .iter()
                .filter(|m| m.category_id.as_deref() == Some(category.id.as_str()))
                .cloned()
                .collect();
            CategoryWithModels {
                id: category.id,
                name: category.name,
                slug: category.slug,
                models,
            }
        })
        .collect()
}
