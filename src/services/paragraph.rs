//! Paragraph service: ordered paragraphs and their derived sentences.
//!
//! DESIGN
//! ======
//! Paragraph positions within an article are dense and 0-based. Inserting
//! at a position shifts later paragraphs up; deleting compacts them down.
//! Sentences are never edited directly: they are re-derived from paragraph
//! content on every create/update, inside the same transaction.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ParagraphError {
    #[error("Article not found")]
    ArticleNotFound,
    #[error("Paragraph not found")]
    NotFound,
    #[error("Sentence not found")]
    SentenceNotFound,
    #[error("You do not have permission to {0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Invalid(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    pub id: Uuid,
    pub paragraph_id: Uuid,
    pub content: String,
    #[serde(rename = "order")]
    pub position: i32,
    /// `{ "annotatedText": ..., "lastUpdated": ... }` once annotated.
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub id: Uuid,
    pub article_id: Uuid,
    pub content: String,
    #[serde(rename = "order")]
    pub position: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[sqlx(skip)]
    pub sentences: Vec<Sentence>,
}

// =============================================================================
// SENTENCE SPLITTING
// =============================================================================

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap_or_else(|e| panic!("sentence regex: {e}")));

/// Split after `.`, `!` or `?` followed by whitespace. Pieces are trimmed and
/// empty pieces dropped.
#[must_use]
pub fn split_sentences(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK.find_iter(content) {
        // The terminator is one ASCII byte and stays with its sentence.
        push_trimmed(&mut out, &content[start..=m.start()]);
        start = m.end();
    }
    push_trimmed(&mut out, &content[start..]);
    out
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece.to_owned());
    }
}

// =============================================================================
// QUERIES
// =============================================================================

const PARAGRAPH_COLUMNS: &str = "id, article_id, content, position, created_at";
const SENTENCE_COLUMNS: &str = "id, paragraph_id, content, position, annotations";

async fn article_author(pool: &PgPool, article_id: Uuid) -> Result<Uuid, ParagraphError> {
    sqlx::query_scalar("SELECT author_id FROM articles WHERE id = $1")
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ParagraphError::ArticleNotFound)
}

async fn load_sentences(pool: &PgPool, paragraphs: &mut [Paragraph]) -> Result<(), sqlx::Error> {
    if paragraphs.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = paragraphs.iter().map(|p| p.id).collect();
    let sentences = sqlx::query_as::<_, Sentence>(&format!(
        "SELECT {SENTENCE_COLUMNS} FROM sentences WHERE paragraph_id = ANY($1) ORDER BY paragraph_id, position"
    ))
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<Sentence>> = HashMap::new();
    for sentence in sentences {
        grouped.entry(sentence.paragraph_id).or_default().push(sentence);
    }
    for paragraph in paragraphs {
        paragraph.sentences = grouped.remove(&paragraph.id).unwrap_or_default();
    }
    Ok(())
}

async fn insert_sentences(
    tx: &mut Transaction<'_, Postgres>,
    paragraph_id: Uuid,
    content: &str,
) -> Result<(), sqlx::Error> {
    let sentences = split_sentences(content);
    if sentences.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO sentences (paragraph_id, content, position) ");
    builder.push_values(sentences.iter().zip(0_i32..), |mut row, (sentence, position)| {
        row.push_bind(paragraph_id).push_bind(sentence).push_bind(position);
    });
    builder.build().execute(tx.as_mut()).await?;
    Ok(())
}

/// Paragraphs of an article in order, each with ordered sentences.
///
/// # Errors
///
/// Returns [`ParagraphError::ArticleNotFound`] or a database error.
pub async fn list_paragraphs(pool: &PgPool, article_id: Uuid) -> Result<Vec<Paragraph>, ParagraphError> {
    article_author(pool, article_id).await?;
    let mut paragraphs = sqlx::query_as::<_, Paragraph>(&format!(
        "SELECT {PARAGRAPH_COLUMNS} FROM paragraphs WHERE article_id = $1 ORDER BY position"
    ))
    .bind(article_id)
    .fetch_all(pool)
    .await?;
    load_sentences(pool, &mut paragraphs).await?;
    Ok(paragraphs)
}

/// A paragraph of `article_id` with its sentences.
///
/// # Errors
///
/// Returns [`ParagraphError::NotFound`] when the paragraph is missing or
/// belongs to another article.
pub async fn get_paragraph(pool: &PgPool, article_id: Uuid, paragraph_id: Uuid) -> Result<Paragraph, ParagraphError> {
    let mut paragraph = sqlx::query_as::<_, Paragraph>(&format!(
        "SELECT {PARAGRAPH_COLUMNS} FROM paragraphs WHERE id = $1 AND article_id = $2"
    ))
    .bind(paragraph_id)
    .bind(article_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ParagraphError::NotFound)?;
    load_sentences(pool, std::slice::from_mut(&mut paragraph)).await?;
    Ok(paragraph)
}

/// Position for a new paragraph: the requested slot, capped at the end so
/// positions stay dense.
#[must_use]
pub fn insert_position(requested: Option<i32>, next: i32) -> i32 {
    requested.map_or(next, |order| order.min(next))
}

/// Insert a paragraph, appending when `order` is `None` or past the end.
///
/// # Errors
///
/// Returns invalid-input, article-not-found, forbidden or database errors.
pub async fn create_paragraph(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    content: &str,
    order: Option<i32>,
) -> Result<Paragraph, ParagraphError> {
    if order.is_some_and(|o| o < 0) {
        return Err(ParagraphError::Invalid("Order must be a non-negative integer"));
    }
    if article_author(pool, article_id).await? != user_id {
        return Err(ParagraphError::Forbidden("modify this article"));
    }

    let mut tx = pool.begin().await?;
    let next: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(position) + 1, 0) FROM paragraphs WHERE article_id = $1")
        .bind(article_id)
        .fetch_one(tx.as_mut())
        .await?;
    let position = insert_position(order, next);
    if position < next {
        sqlx::query("UPDATE paragraphs SET position = position + 1 WHERE article_id = $1 AND position >= $2")
            .bind(article_id)
            .bind(position)
            .execute(tx.as_mut())
            .await?;
    }
    let paragraph_id: Uuid =
        sqlx::query_scalar("INSERT INTO paragraphs (article_id, content, position) VALUES ($1, $2, $3) RETURNING id")
            .bind(article_id)
            .bind(content)
            .bind(position)
            .fetch_one(tx.as_mut())
            .await?;
    insert_sentences(&mut tx, paragraph_id, content).await?;
    tx.commit().await?;

    tracing::info!(%article_id, %paragraph_id, position, "paragraph created");
    get_paragraph(pool, article_id, paragraph_id).await
}

async fn owned_paragraph_position(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    paragraph_id: Uuid,
    action: &'static str,
) -> Result<i32, ParagraphError> {
    let (position, author_id) = sqlx::query_as::<_, (i32, Uuid)>(
        "SELECT p.position, a.author_id
         FROM paragraphs p JOIN articles a ON a.id = p.article_id
         WHERE p.id = $1 AND p.article_id = $2",
    )
    .bind(paragraph_id)
    .bind(article_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ParagraphError::NotFound)?;
    if author_id != user_id {
        return Err(ParagraphError::Forbidden(action));
    }
    Ok(position)
}

/// Replace paragraph content and re-derive its sentences.
///
/// # Errors
///
/// Returns not-found, forbidden or database errors.
pub async fn update_paragraph(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    paragraph_id: Uuid,
    content: &str,
) -> Result<Paragraph, ParagraphError> {
    owned_paragraph_position(pool, user_id, article_id, paragraph_id, "update this paragraph").await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM sentences WHERE paragraph_id = $1")
        .bind(paragraph_id)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("UPDATE paragraphs SET content = $2 WHERE id = $1")
        .bind(paragraph_id)
        .bind(content)
        .execute(tx.as_mut())
        .await?;
    insert_sentences(&mut tx, paragraph_id, content).await?;
    tx.commit().await?;

    get_paragraph(pool, article_id, paragraph_id).await
}

/// Delete a paragraph and close the gap in positions.
///
/// # Errors
///
/// Returns not-found, forbidden or database errors.
pub async fn delete_paragraph(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    paragraph_id: Uuid,
) -> Result<(), ParagraphError> {
    let position = owned_paragraph_position(pool, user_id, article_id, paragraph_id, "delete this paragraph").await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM paragraphs WHERE id = $1")
        .bind(paragraph_id)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("UPDATE paragraphs SET position = position - 1 WHERE article_id = $1 AND position > $2")
        .bind(article_id)
        .bind(position)
        .execute(tx.as_mut())
        .await?;
    tx.commit().await?;

    tracing::info!(%article_id, %paragraph_id, "paragraph deleted");
    Ok(())
}

// =============================================================================
// SENTENCE ANNOTATIONS
// =============================================================================

/// A sentence together with the context needed to annotate it.
#[derive(Debug, Clone)]
pub struct SentenceContext {
    pub sentence: Sentence,
    pub paragraph_content: String,
    pub author_id: Uuid,
}

/// Load a sentence, its paragraph text and the owning article's author.
///
/// # Errors
///
/// Returns [`ParagraphError::SentenceNotFound`] or a database error.
pub async fn sentence_context(pool: &PgPool, sentence_id: Uuid) -> Result<SentenceContext, ParagraphError> {
    let sentence = sqlx::query_as::<_, Sentence>(&format!("SELECT {SENTENCE_COLUMNS} FROM sentences WHERE id = $1"))
        .bind(sentence_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ParagraphError::SentenceNotFound)?;
    let (paragraph_content, author_id) = sqlx::query_as::<_, (String, Uuid)>(
        "SELECT p.content, a.author_id FROM paragraphs p JOIN articles a ON a.id = p.article_id WHERE p.id = $1",
    )
    .bind(sentence.paragraph_id)
    .fetch_one(pool)
    .await?;
    Ok(SentenceContext { sentence, paragraph_content, author_id })
}

/// A paragraph (with sentences) plus its article id and author.
///
/// # Errors
///
/// Returns [`ParagraphError::NotFound`] or a database error.
pub async fn paragraph_with_owner(pool: &PgPool, paragraph_id: Uuid) -> Result<(Paragraph, Uuid), ParagraphError> {
    let mut paragraph =
        sqlx::query_as::<_, Paragraph>(&format!("SELECT {PARAGRAPH_COLUMNS} FROM paragraphs WHERE id = $1"))
            .bind(paragraph_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ParagraphError::NotFound)?;
    let author_id: Uuid = sqlx::query_scalar("SELECT author_id FROM articles WHERE id = $1")
        .bind(paragraph.article_id)
        .fetch_one(pool)
        .await?;
    load_sentences(pool, std::slice::from_mut(&mut paragraph)).await?;
    Ok((paragraph, author_id))
}

/// The `annotatedText` stored on a sentence, if any.
#[must_use]
pub fn annotated_text(sentence: &Sentence) -> Option<&str> {
    sentence
        .annotations
        .as_ref()
        .and_then(|a| a.get("annotatedText"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Overwrite a sentence's annotation document.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn set_sentence_annotation(pool: &PgPool, sentence_id: Uuid, annotated: &str) -> Result<(), sqlx::Error> {
    let now = OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let doc = serde_json::json!({ "annotatedText": annotated, "lastUpdated": now });
    sqlx::query("UPDATE sentences SET annotations = $2 WHERE id = $1")
        .bind(sentence_id)
        .bind(doc)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "paragraph_test.rs"]
mod tests;
