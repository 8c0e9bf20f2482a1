//! Paragraph illustration route (admin only).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::auth::AuthUser;
use super::{ApiError, JsonBody, image_failure};
use crate::services::image::{self, ImageError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageBody {
    paragraph_id: Option<String>,
    selected_text: Option<String>,
    full_context: Option<String>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl GenerateImageBody {
    fn parts(&self) -> Result<(Uuid, &str, &str), ApiError> {
        let (Some(raw_id), Some(selected), Some(context)) = (
            present(self.paragraph_id.as_deref()),
            present(self.selected_text.as_deref()),
            present(self.full_context.as_deref()),
        ) else {
            return Err(image_failure(
                StatusCode::BAD_REQUEST,
                "Missing required fields: paragraphId, selectedText, fullContext",
                "VALIDATION_ERROR",
            ));
        };
        // A malformed id cannot name a paragraph.
        let paragraph_id = Uuid::parse_str(raw_id).map_err(|_| ImageError::ParagraphNotFound)?;
        Ok((paragraph_id, selected, context))
    }
}

/// `POST /api/generate-paragraph-image`
pub async fn generate_paragraph_image(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(body): JsonBody<GenerateImageBody>,
) -> Result<Json<Value>, ApiError> {
    if !auth.user.is_admin() {
        return Err(image_failure(StatusCode::FORBIDDEN, "Admin access required", "AUTH_ERROR"));
    }
    let (paragraph_id, selected_text, full_context) = body.parts()?;
    let Some(imaging) = state.imaging.as_ref() else {
        return Err(image_failure(StatusCode::SERVICE_UNAVAILABLE, "Image generation is not configured", "AI_ERROR"));
    };
    if let Err(e) = state.rate_limiter.check_and_record(auth.user.id) {
        return Err(image_failure(StatusCode::TOO_MANY_REQUESTS, &e.to_string(), "RATE_LIMITED"));
    }

    let image_url =
        image::generate_for_paragraph(&state.pool, imaging, auth.user.id, paragraph_id, selected_text, full_context)
            .await?;
    Ok(Json(json!({ "success": true, "imageUrl": image_url })))
}

#[cfg(test)]
#[path = "images_test.rs"]
mod tests;
