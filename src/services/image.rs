//! Paragraph illustrations: prompt optimisation, Imagen, upload, record.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! selected text + context
//!   → prompter (paying-key Gemini) → optimised prompt
//!   → painter (Imagen) with cartoon style suffix → base64 PNG
//!   → store (Cloudinary) → secure URL
//!   → generated_images row
//! ```
//! Each stage has its own error so the route can report which step failed.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::image_store::{ImageStore, StoreError};
use super::prompts;
use crate::llm::{ImageModel, LlmError, TextModel};

pub const IMAGE_FOLDER: &str = "paragraph-images";

// =============================================================================
// TYPES
// =============================================================================

/// The three collaborators of the image pipeline.
#[derive(Clone)]
pub struct Imaging {
    pub prompter: Arc<dyn TextModel>,
    pub painter: Arc<dyn ImageModel>,
    pub store: Arc<dyn ImageStore>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: Uuid,
    pub article_id: Uuid,
    pub paragraph_id: Uuid,
    pub image_url: String,
    pub prompt: String,
    pub selected_text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Paragraph not found or access denied")]
    ParagraphNotFound,
    #[error("Failed to optimize image prompt")]
    PromptOptimization(#[source] LlmError),
    #[error("Failed to generate image")]
    Generation(#[source] LlmError),
    #[error("Failed to upload image to cloud storage")]
    Upload(#[source] StoreError),
    #[error("Failed to save image information")]
    Save(#[source] sqlx::Error),
    #[error("Internal server error")]
    Database(#[from] sqlx::Error),
}

impl ImageError {
    /// Machine-readable category sent to the client.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParagraphNotFound => "VALIDATION_ERROR",
            Self::PromptOptimization(_) | Self::Generation(_) => "AI_ERROR",
            Self::Upload(_) | Self::Save(_) | Self::Database(_) => "STORAGE_ERROR",
        }
    }
}

/// An uploaded image and the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub url: String,
    pub prompt: String,
}

#[must_use]
pub fn public_id(paragraph_id: Uuid, unix_ms: i128) -> String {
    format!("paragraph-{paragraph_id}-{unix_ms}")
}

// =============================================================================
// PIPELINE
// =============================================================================

impl Imaging {
    /// Optimise the prompt, paint, and upload.
    ///
    /// # Errors
    ///
    /// Returns the [`ImageError`] of the first failing stage.
    pub async fn render(
        &self,
        paragraph_id: Uuid,
        selected_text: &str,
        full_context: &str,
    ) -> Result<RenderedImage, ImageError> {
        let request = prompts::image_prompt(selected_text, full_context);
        let optimized = self
            .prompter
            .generate(self.prompter.default_model(), &request)
            .await
            .map_err(ImageError::PromptOptimization)?
            .trim()
            .to_owned();
        if optimized.is_empty() {
            return Err(ImageError::PromptOptimization(LlmError::ApiParse("empty optimized prompt".into())));
        }

        let styled = format!("{optimized}{}", prompts::CARTOON_STYLE_SUFFIX);
        let png = self.painter.generate_image(&styled).await.map_err(ImageError::Generation)?;

        let unix_ms = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let url = self
            .store
            .upload_png(&png, IMAGE_FOLDER, &public_id(paragraph_id, unix_ms))
            .await
            .map_err(ImageError::Upload)?;
        Ok(RenderedImage { url, prompt: optimized })
    }
}

/// Illustrate a paragraph owned by `user_id` and record the result.
/// Returns the image URL.
///
/// # Errors
///
/// Returns [`ImageError::ParagraphNotFound`] for missing or foreign
/// paragraphs, or the error of the failing stage.
pub async fn generate_for_paragraph(
    pool: &PgPool,
    imaging: &Imaging,
    user_id: Uuid,
    paragraph_id: Uuid,
    selected_text: &str,
    full_context: &str,
) -> Result<String, ImageError> {
    let article_id: Uuid = sqlx::query_scalar(
        "SELECT p.article_id FROM paragraphs p JOIN articles a ON a.id = p.article_id
         WHERE p.id = $1 AND a.author_id = $2",
    )
    .bind(paragraph_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ImageError::ParagraphNotFound)?;

    let rendered = imaging.render(paragraph_id, selected_text, full_context).await?;

    sqlx::query(
        "INSERT INTO generated_images (article_id, paragraph_id, image_url, prompt, selected_text)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(article_id)
    .bind(paragraph_id)
    .bind(&rendered.url)
    .bind(&rendered.prompt)
    .bind(selected_text)
    .execute(pool)
    .await
    .map_err(ImageError::Save)?;

    tracing::info!(%article_id, %paragraph_id, url = %rendered.url, "paragraph image generated");
    Ok(rendered.url)
}

/// Images of an article, oldest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_for_article(pool: &PgPool, article_id: Uuid) -> Result<Vec<GeneratedImage>, sqlx::Error> {
    sqlx::query_as::<_, GeneratedImage>(
        "SELECT id, article_id, paragraph_id, image_url, prompt, selected_text, created_at
         FROM generated_images WHERE article_id = $1 ORDER BY created_at ASC",
    )
    .bind(article_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
#[path = "image_test.rs"]
mod tests;
