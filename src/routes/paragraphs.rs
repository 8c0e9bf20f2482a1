//! Paragraph routes: ordered paragraphs of an article and their sentences.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::ai::require_reader;
use super::articles::{article_id, parse_id};
use super::auth::AuthUser;
use super::{ApiError, JsonBody};
use crate::services::paragraph;
use crate::state::AppState;

const ORDER_MESSAGE: &str = "Order must be a non-negative integer";

fn paragraph_ids(id: &str, paragraph_id: &str) -> Result<(Uuid, Uuid), ApiError> {
    Ok((article_id(id)?, parse_id(paragraph_id, "Paragraph not found")?))
}

/// `None` and `null` append; any other non-integer is rejected.
fn parse_order(order: Option<&Value>) -> Result<Option<i32>, ApiError> {
    match order {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ApiError::message(StatusCode::BAD_REQUEST, ORDER_MESSAGE)),
    }
}

fn required_content(content: Option<String>) -> Result<String, ApiError> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::message(StatusCode::BAD_REQUEST, "Content is required"))
}

/// `GET /api/articles/{id}/paragraphs`
pub async fn list_paragraphs(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let article_id = require_reader(&state, auth.user.id, &id).await?;
    let paragraphs = paragraph::list_paragraphs(&state.pool, article_id).await?;
    Ok(Json(json!({ "data": paragraphs })))
}

#[derive(Debug, Deserialize)]
pub struct CreateParagraphBody {
    content: Option<String>,
    order: Option<Value>,
}

/// `POST /api/articles/{id}/paragraphs`
pub async fn create_paragraph(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateParagraphBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let article_id = article_id(&id)?;
    let content = required_content(body.content)?;
    let order = parse_order(body.order.as_ref())?;
    let created = paragraph::create_paragraph(&state.pool, auth.user.id, article_id, &content, order).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": created }))))
}

/// `GET /api/articles/{id}/paragraphs/{paragraph_id}`
pub async fn get_paragraph(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, paragraph_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (article_id, paragraph_id) = paragraph_ids(&id, &paragraph_id)?;
    require_reader(&state, auth.user.id, &id).await?;
    let found = paragraph::get_paragraph(&state.pool, article_id, paragraph_id).await?;
    Ok(Json(json!({ "data": found })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateParagraphBody {
    content: Option<String>,
}

/// `PUT /api/articles/{id}/paragraphs/{paragraph_id}`
pub async fn update_paragraph(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, paragraph_id)): Path<(String, String)>,
    JsonBody(body): JsonBody<UpdateParagraphBody>,
) -> Result<Json<Value>, ApiError> {
    let (article_id, paragraph_id) = paragraph_ids(&id, &paragraph_id)?;
    let content = required_content(body.content)?;
    let updated = paragraph::update_paragraph(&state.pool, auth.user.id, article_id, paragraph_id, &content).await?;
    Ok(Json(json!({ "data": updated })))
}

/// `DELETE /api/articles/{id}/paragraphs/{paragraph_id}`
pub async fn delete_paragraph(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, paragraph_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (article_id, paragraph_id) = paragraph_ids(&id, &paragraph_id)?;
    paragraph::delete_paragraph(&state.pool, auth.user.id, article_id, paragraph_id).await?;
    Ok(Json(json!({ "data": { "message": "Paragraph deleted successfully" } })))
}

#[cfg(test)]
#[path = "paragraphs_test.rs"]
mod tests;
