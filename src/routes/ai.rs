//! Streaming AI routes: grammar, explanation, translation, chat.
//!
//! DESIGN
//! ======
//! Each handler validates its body, checks that the caller may read the
//! article, spends one rate-limit slot, and answers with an NDJSON body fed
//! by [`relay`]. Model failures after the headers are sent are reported
//! in-band as `{"error": ...}` lines.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::articles::article_id;
use super::auth::AuthUser;
use super::{ApiError, JsonBody};
use crate::llm::TextModel;
use crate::services::article;
use crate::services::prompts::{self, ChatMessage};
use crate::services::relay::relay;
use crate::state::AppState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// =============================================================================
// SHARED GUARDS
// =============================================================================

/// Spend a rate-limit slot for `user_id` and hand out the text model.
///
/// # Errors
///
/// 429 when a limit is hit, 503 when no model is configured.
pub(crate) fn text_model(state: &AppState, user_id: Uuid) -> Result<Arc<dyn TextModel>, ApiError> {
    let Some(llm) = state.llm.clone() else {
        return Err(ApiError::message(StatusCode::SERVICE_UNAVAILABLE, "AI service is not configured"));
    };
    state.rate_limiter.check_and_record(user_id)?;
    Ok(llm)
}

/// The author, or anyone when the article is public.
pub(crate) async fn require_reader(state: &AppState, user_id: Uuid, raw_id: &str) -> Result<Uuid, ApiError> {
    let article_id = article_id(raw_id)?;
    article::access(&state.pool, article_id).await?.require_reader(user_id)?;
    Ok(article_id)
}

fn required(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Stream `prompt` as NDJSON.
pub(crate) fn ndjson(llm: Arc<dyn TextModel>, prompt: String) -> Response {
    let model = llm.default_model().to_owned();
    let body = Body::from_stream(relay(llm, model, prompt));
    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE), (header::CACHE_CONTROL, "no-cache")], body).into_response()
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionBody {
    selected_text: Option<String>,
    paragraph_content: Option<String>,
}

impl SelectionBody {
    fn parts(&self) -> Result<(&str, &str), ApiError> {
        match (required(self.selected_text.as_deref()), required(self.paragraph_content.as_deref())) {
            (Some(selected), Some(paragraph)) => Ok((selected, paragraph)),
            _ => Err(ApiError::message(
                StatusCode::BAD_REQUEST,
                "Selected text and paragraph content are required",
            )),
        }
    }
}

/// `POST /api/articles/{id}/grammar`
pub async fn grammar(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<SelectionBody>,
) -> Result<Response, ApiError> {
    let (selected, paragraph) = body.parts()?;
    let article_id = require_reader(&state, auth.user.id, &id).await?;
    let llm = text_model(&state, auth.user.id)?;
    tracing::info!(%article_id, user_id = %auth.user.id, "grammar stream requested");
    Ok(ndjson(llm, prompts::grammar(selected, paragraph)))
}

/// `POST /api/articles/{id}/explain`
pub async fn explain(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<SelectionBody>,
) -> Result<Response, ApiError> {
    let (selected, paragraph) = body.parts()?;
    let article_id = require_reader(&state, auth.user.id, &id).await?;
    let llm = text_model(&state, auth.user.id)?;
    tracing::info!(%article_id, user_id = %auth.user.id, "explain stream requested");
    Ok(ndjson(llm, prompts::explain(selected, paragraph)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateBody {
    paragraph_markdown: Option<String>,
    full_context_with_target: Option<String>,
}

/// `POST /api/articles/{id}/translate`
pub async fn translate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<TranslateBody>,
) -> Result<Response, ApiError> {
    let Some(markdown) = required(body.paragraph_markdown.as_deref()) else {
        return Err(ApiError::message(StatusCode::BAD_REQUEST, "Paragraph markdown content is required"));
    };
    let article_id = require_reader(&state, auth.user.id, &id).await?;
    let llm = text_model(&state, auth.user.id)?;
    tracing::info!(%article_id, user_id = %auth.user.id, "translate stream requested");
    Ok(ndjson(llm, prompts::translate(markdown, body.full_context_with_target.as_deref())))
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    messages: Option<Vec<ChatMessage>>,
}

/// `POST /api/articles/{id}/chat`
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ChatBody>,
) -> Result<Response, ApiError> {
    let Some(messages) = body.messages.filter(|m| !m.is_empty()) else {
        return Err(ApiError::message(StatusCode::BAD_REQUEST, "Messages are required"));
    };
    let article_id = require_reader(&state, auth.user.id, &id).await?;
    let llm = text_model(&state, auth.user.id)?;
    tracing::info!(%article_id, user_id = %auth.user.id, turns = messages.len(), "chat stream requested");
    Ok(ndjson(llm, prompts::chat(&messages)))
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;
