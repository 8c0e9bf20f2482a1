//! Prompt passthrough: run a caller-supplied prompt and optionally write the
//! answer into a paragraph's sentence annotations.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::ai::text_model;
use super::auth::AuthUser;
use super::{ApiError, JsonBody};
use crate::llm;
use crate::services::annotation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    prompt: Option<String>,
    paragraph_id: Option<String>,
    sentence_id: Option<String>,
    selected_text: Option<String>,
}

/// Ids that do not parse cannot name a row, so they read as absent.
fn optional_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s).ok())
}

/// A sentence id that was sent but does not parse still pins the target, to
/// the nil id, which matches no sentence.
fn sentence_target(raw: Option<&str>) -> Option<Uuid> {
    raw.filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).unwrap_or(Uuid::nil()))
}

fn generation_failed() -> ApiError {
    ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process with Gemini")
}

/// `POST /api/gemini`
pub async fn generate(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<GenerateBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(prompt) = body.prompt.filter(|p| !p.is_empty()) else {
        return Err(ApiError::message(StatusCode::BAD_REQUEST, "Prompt is required"));
    };
    let llm = text_model(&state, auth.user.id)?;
    let result = llm::generate_with_rotation(llm.as_ref(), llm.default_model(), &prompt)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "gemini passthrough failed");
            generation_failed()
        })?;

    if let Some(paragraph_id) = optional_id(body.paragraph_id.as_deref()) {
        let applied = annotation::annotate_paragraph(
            &state.pool,
            auth.user.id,
            paragraph_id,
            sentence_target(body.sentence_id.as_deref()),
            body.selected_text.as_deref(),
            &result,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, %paragraph_id, "passthrough annotation failed");
            generation_failed()
        })?;
        tracing::info!(%paragraph_id, applied, "passthrough result processed");
    }

    Ok(Json(json!({ "data": result })))
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
