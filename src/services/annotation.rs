//! Annotation service: block annotations and sentence-level markers.
//!
//! DESIGN
//! ======
//! Two kinds of annotation coexist:
//! - rows in `annotations`, anchored to a content block by a span
//!   (`startElement/startOffset/endElement/endOffset`);
//! - `[text|meaning]` markers embedded in a sentence's `annotatedText`,
//!   written by the retry and passthrough flows.
//!
//! Marker merging is pure string work and lives in free functions so it can
//! be tested without a database.

use regex::{NoExpand, Regex};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::paragraph::{self, ParagraphError, Sentence};
use super::prompts;
use crate::llm::{self, LlmError, TextModel};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("Article not found")]
    ArticleNotFound,
    #[error("Sentence not found")]
    SentenceNotFound,
    #[error("You do not have permission to {0}")]
    Forbidden(&'static str),
    #[error("You don't have permission to retry this annotation")]
    RetryForbidden,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ParagraphError> for AnnotationError {
    fn from(err: ParagraphError) -> Self {
        match err {
            ParagraphError::Database(e) => Self::Database(e),
            ParagraphError::ArticleNotFound => Self::ArticleNotFound,
            _ => Self::SentenceNotFound,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: Uuid,
    pub article_id: Uuid,
    pub block_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub selected_text: String,
    pub result: String,
    pub span: Value,
    pub root_result: Option<Value>,
    pub metadata: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Sort order by `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Oldest,
    Newest,
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Self::Oldest => " ORDER BY \"timestamp\" ASC",
            Self::Newest => " ORDER BY \"timestamp\" DESC",
        }
    }
}

#[derive(Debug)]
pub struct NewAnnotation {
    pub block_id: String,
    pub kind: String,
    pub selected_text: String,
    pub result: String,
    pub span: Value,
    pub root_result: Option<Value>,
    pub metadata: Value,
}

/// Which annotations a delete removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    One(Uuid),
    Block(String),
    All,
}

/// A span needs string element ids and numeric offsets.
#[must_use]
pub fn is_valid_span(span: &Value) -> bool {
    let element = |key: &str| span.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty());
    let offset = |key: &str| span.get(key).is_some_and(Value::is_number);
    element("startElement") && element("endElement") && offset("startOffset") && offset("endOffset")
}

// =============================================================================
// QUERIES
// =============================================================================

const ANNOTATION_COLUMNS: &str =
    "id, article_id, block_id, kind, selected_text, result, span, root_result, metadata, \"timestamp\"";

/// Annotations of an article, optionally filtered by block and type.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_for_article(
    pool: &PgPool,
    article_id: Uuid,
    block_id: Option<&str>,
    kind: Option<&str>,
    order: Order,
) -> Result<Vec<Annotation>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE article_id = "));
    builder.push_bind(article_id);
    if let Some(block_id) = block_id {
        builder.push(" AND block_id = ").push_bind(block_id);
    }
    if let Some(kind) = kind {
        builder.push(" AND kind = ").push_bind(kind);
    }
    builder.push(order.sql());
    builder.build_query_as::<Annotation>().fetch_all(pool).await
}

async fn article_author(pool: &PgPool, article_id: Uuid) -> Result<Uuid, AnnotationError> {
    sqlx::query_scalar("SELECT author_id FROM articles WHERE id = $1")
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AnnotationError::ArticleNotFound)
}

/// Check that `user_id` may annotate `article_id`.
///
/// # Errors
///
/// Returns not-found, forbidden or database errors.
pub async fn require_annotator(pool: &PgPool, user_id: Uuid, article_id: Uuid) -> Result<(), AnnotationError> {
    if article_author(pool, article_id).await? == user_id {
        Ok(())
    } else {
        Err(AnnotationError::Forbidden("annotate this article"))
    }
}

/// Store an annotation on an article owned by `user_id`.
///
/// # Errors
///
/// Returns invalid-span, not-found, forbidden or database errors.
pub async fn create_annotation(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    input: NewAnnotation,
) -> Result<Annotation, AnnotationError> {
    if !is_valid_span(&input.span) {
        return Err(AnnotationError::Invalid("Invalid span structure"));
    }
    require_annotator(pool, user_id, article_id).await?;

    let annotation = sqlx::query_as::<_, Annotation>(&format!(
        "INSERT INTO annotations (article_id, block_id, kind, selected_text, result, span, root_result, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {ANNOTATION_COLUMNS}"
    ))
    .bind(article_id)
    .bind(&input.block_id)
    .bind(&input.kind)
    .bind(&input.selected_text)
    .bind(&input.result)
    .bind(&input.span)
    .bind(&input.root_result)
    .bind(&input.metadata)
    .fetch_one(pool)
    .await?;
    tracing::info!(%article_id, annotation_id = %annotation.id, kind = %annotation.kind, "annotation created");
    Ok(annotation)
}

/// Delete annotations of an article owned by `user_id`; returns how many.
///
/// # Errors
///
/// Returns not-found, forbidden or database errors.
pub async fn delete_annotations(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    scope: DeleteScope,
) -> Result<u64, AnnotationError> {
    if article_author(pool, article_id).await? != user_id {
        return Err(AnnotationError::Forbidden("delete annotations for this article"));
    }
    let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM annotations WHERE article_id = ");
    builder.push_bind(article_id);
    match &scope {
        DeleteScope::One(id) => {
            builder.push(" AND id = ").push_bind(*id);
        }
        DeleteScope::Block(block_id) => {
            builder.push(" AND block_id = ").push_bind(block_id.as_str());
        }
        DeleteScope::All => {}
    }
    let deleted = builder.build().execute(pool).await?.rows_affected();
    tracing::info!(%article_id, ?scope, deleted, "annotations deleted");
    Ok(deleted)
}

// =============================================================================
// SENTENCE MARKERS
// =============================================================================

/// Merge a fresh `[text|meaning]` marker into a sentence.
///
/// With existing annotated text: every `[text|...]` marker is replaced; if
/// there is none, the first plain occurrence of `text` is; otherwise the
/// marker is applied to the original sentence instead. Without annotated
/// text the marker is applied to the original sentence.
#[must_use]
pub fn merge_marker(sentence_content: &str, annotated: Option<&str>, text: &str, marker: &str) -> String {
    let Some(annotated) = annotated else {
        return sentence_content.replacen(text, marker, 1);
    };
    let pattern = format!(r"\[{}\|(.*?)\]", regex::escape(text));
    if let Ok(existing) = Regex::new(&pattern) {
        if existing.is_match(annotated) {
            return existing.replace_all(annotated, NoExpand(marker)).into_owned();
        }
    }
    if annotated.contains(text) {
        annotated.replacen(text, marker, 1)
    } else {
        sentence_content.replacen(text, marker, 1)
    }
}

/// Ask the model for a fresh marker for `text` and merge it into the sentence.
/// Returns the raw model output.
///
/// # Errors
///
/// Returns sentence-not-found, forbidden, model or database errors.
pub async fn retry_sentence(
    pool: &PgPool,
    llm: &dyn TextModel,
    user_id: Uuid,
    sentence_id: Uuid,
    text: &str,
) -> Result<String, AnnotationError> {
    let ctx = paragraph::sentence_context(pool, sentence_id).await?;
    if ctx.author_id != user_id {
        return Err(AnnotationError::RetryForbidden);
    }

    let prompt = prompts::annotation_retry(text, &ctx.paragraph_content);
    let marker = llm::generate_with_rotation(llm, llm.default_model(), &prompt).await?;

    let merged = merge_marker(&ctx.sentence.content, paragraph::annotated_text(&ctx.sentence), text, &marker);
    paragraph::set_sentence_annotation(pool, sentence_id, &merged).await?;
    tracing::info!(%sentence_id, "sentence annotation retried");
    Ok(marker)
}

/// Decide which sentence receives a passthrough result and its new
/// annotated text.
///
/// - `sentence_id`: that sentence (if it is in `sentences`) gets `result`.
/// - `selected_text`: the first sentence containing it gets the selection
///   replaced; failing that, the first sentence gets `result` appended to
///   its annotated text, or the selection replaced in its content.
/// - neither: the first sentence gets `result` whole.
#[must_use]
pub fn plan_passthrough(
    sentences: &[Sentence],
    sentence_id: Option<Uuid>,
    selected_text: Option<&str>,
    result: &str,
) -> Option<(Uuid, String)> {
    if let Some(sentence_id) = sentence_id {
        return sentences
            .iter()
            .find(|s| s.id == sentence_id)
            .map(|s| (s.id, result.to_owned()));
    }
    let first = sentences.first()?;
    let Some(selected) = selected_text.filter(|s| !s.is_empty()) else {
        return Some((first.id, result.to_owned()));
    };

    if let Some(holder) = sentences.iter().find(|s| s.content.contains(selected)) {
        let base = paragraph::annotated_text(holder).unwrap_or(&holder.content);
        return Some((holder.id, base.replacen(selected, result, 1)));
    }
    let text = match paragraph::annotated_text(first) {
        Some(existing) => format!("{existing} {result}"),
        None => first.content.replacen(selected, result, 1),
    };
    Some((first.id, text))
}

/// Write a passthrough result into a paragraph owned by `user_id`. Missing
/// paragraphs and other users' paragraphs are left untouched.
///
/// # Errors
///
/// Returns a database error if a query fails.
pub async fn annotate_paragraph(
    pool: &PgPool,
    user_id: Uuid,
    paragraph_id: Uuid,
    sentence_id: Option<Uuid>,
    selected_text: Option<&str>,
    result: &str,
) -> Result<bool, sqlx::Error> {
    let (paragraph, author_id) = match paragraph::paragraph_with_owner(pool, paragraph_id).await {
        Ok(found) => found,
        Err(ParagraphError::Database(e)) => return Err(e),
        Err(_) => return Ok(false),
    };
    if author_id != user_id {
        return Ok(false);
    }
    let Some((target, text)) = plan_passthrough(&paragraph.sentences, sentence_id, selected_text, result) else {
        return Ok(false);
    };
    paragraph::set_sentence_annotation(pool, target, &text).await?;
    Ok(true)
}

#[cfg(test)]
#[path = "annotation_test.rs"]
mod tests;
