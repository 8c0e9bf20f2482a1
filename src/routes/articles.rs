//! Article routes: paginated listing, CRUD, single-block replacement.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::auth::AuthUser;
use super::{ApiError, JsonBody};
use crate::services::article::{self, ArticlePatch, NewArticle};
use crate::state::AppState;

/// Parse a path id; anything that is not a UUID cannot name an existing row.
pub(crate) fn parse_id(raw: &str, not_found: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::message(StatusCode::NOT_FOUND, not_found))
}

pub(crate) fn article_id(raw: &str) -> Result<Uuid, ApiError> {
    parse_id(raw, "Article not found")
}

/// Unparseable or missing page numbers read as the first page.
fn page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse().ok()).unwrap_or(1)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<String>,
}

/// `GET /api/articles?page=N`
pub async fn list_articles(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = page_number(query.page.as_deref());
    let (articles, pagination) = article::list_articles(&state.pool, auth.user.id, page).await?;
    Ok(Json(json!({ "data": articles, "pagination": pagination })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleBody {
    title: Option<String>,
    description: Option<String>,
    content: Option<Value>,
    is_public: Option<bool>,
}

/// `POST /api/articles`
pub async fn create_article(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<CreateArticleBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (Some(title), Some(content)) = (body.title.filter(|t| !t.is_empty()), body.content.filter(|c| !c.is_null()))
    else {
        return Err(ApiError::message(StatusCode::BAD_REQUEST, "Title and content are required"));
    };
    let input = NewArticle {
        title,
        description: body.description,
        content,
        is_public: body.is_public.unwrap_or(false),
    };
    let created = article::create_article(&state.pool, auth.user.id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": created,
            "message": "Article created successfully with ultra-modern content structure",
        })),
    ))
}

/// `GET /api/articles/{id}`: readable by the author, or anyone when public.
pub async fn get_article(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let article_id = article_id(&id)?;
    let detail = article::get_article(&state.pool, article_id).await?;
    article::ArticleAccess { author_id: detail.article.author_id, is_public: detail.article.is_public }
        .require_reader(auth.user.id)?;
    Ok(Json(json!({ "data": detail })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticleBody {
    title: Option<String>,
    description: Option<String>,
    content: Option<Value>,
    is_public: Option<bool>,
}

/// `PUT /api/articles/{id}`
pub async fn update_article(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateArticleBody>,
) -> Result<Json<Value>, ApiError> {
    let article_id = article_id(&id)?;
    let patch = ArticlePatch {
        title: body.title,
        description: body.description,
        content: body.content.filter(|c| !c.is_null()),
        is_public: body.is_public,
    };
    let updated = article::update_article(&state.pool, auth.user.id, article_id, patch).await?;
    Ok(Json(json!({ "data": updated })))
}

/// `DELETE /api/articles/{id}`
pub async fn delete_article(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let article_id = article_id(&id)?;
    article::delete_article(&state.pool, auth.user.id, article_id).await?;
    Ok(Json(json!({ "data": { "message": "Article deleted successfully" } })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBlockBody {
    block: Option<Value>,
}

/// `PUT /api/articles/{id}/blocks/{block_id}`
pub async fn update_block(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, block_id)): Path<(String, String)>,
    JsonBody(body): JsonBody<UpdateBlockBody>,
) -> Result<Json<Value>, ApiError> {
    let article_id = article_id(&id)?;
    let block = body.block.unwrap_or(Value::Null);
    let updated = article::update_block(&state.pool, auth.user.id, article_id, &block_id, block).await?;
    tracing::info!(%article_id, %block_id, "article block updated");
    Ok(Json(json!({
        "data": {
            "id": updated.id,
            "title": updated.title,
            "content": updated.content,
            "updatedAt": updated.updated_at.format(&time::format_description::well_known::Rfc3339).ok(),
        },
        "message": "Block structure updated successfully",
    })))
}

#[cfg(test)]
#[path = "articles_test.rs"]
mod tests;
