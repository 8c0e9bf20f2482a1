//! Article service: CRUD, pagination, block replacement, access checks.
//!
//! DESIGN
//! ======
//! Article content is an opaque rich-content JSON document. The only shape
//! the server relies on is a top-level `blocks` array whose entries carry an
//! `id`, which is what block replacement keys on.

use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::annotation::{self, Annotation};
use super::image::{self, GeneratedImage};

pub const PAGE_SIZE: i64 = 10;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ArticleError {
    #[error("Article not found")]
    NotFound,
    #[error("You do not have permission to {0} this article")]
    Forbidden(&'static str),
    #[error("You don't have access to this article")]
    NoAccess,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("Block not found in article")]
    BlockNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub content: Value,
    pub author_id: Uuid,
    pub is_public: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub username: String,
}

/// Article with its author, annotations and generated images.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub author: Author,
    pub annotations: Vec<Annotation>,
    pub generated_images: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl Pagination {
    /// Page numbers below 1 are clamped to 1.
    #[must_use]
    pub fn new(page: i64, total_count: i64) -> Self {
        let page = page.max(1);
        let total_pages = (total_count + PAGE_SIZE - 1) / PAGE_SIZE;
        Self {
            page,
            page_size: PAGE_SIZE,
            total_pages,
            total_count,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }

    /// Row offset of the page. Saturates for absurd page numbers, which
    /// then simply select no rows.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(PAGE_SIZE)
    }
}

/// Ownership facts needed for permission checks.
#[derive(Debug, Clone, Copy)]
pub struct ArticleAccess {
    pub author_id: Uuid,
    pub is_public: bool,
}

impl ArticleAccess {
    /// Only the author may `action` the article.
    ///
    /// # Errors
    ///
    /// Returns [`ArticleError::Forbidden`] for anyone else.
    pub fn require_owner(&self, user_id: Uuid, action: &'static str) -> Result<(), ArticleError> {
        if self.author_id == user_id {
            Ok(())
        } else {
            Err(ArticleError::Forbidden(action))
        }
    }

    /// The author, or anyone when the article is public.
    ///
    /// # Errors
    ///
    /// Returns [`ArticleError::NoAccess`] otherwise.
    pub fn require_reader(&self, user_id: Uuid) -> Result<(), ArticleError> {
        if self.author_id == user_id || self.is_public {
            Ok(())
        } else {
            Err(ArticleError::NoAccess)
        }
    }
}

// =============================================================================
// CONTENT SHAPE
// =============================================================================

/// Require `content.blocks` to be an array.
///
/// # Errors
///
/// Returns [`ArticleError::Invalid`] otherwise.
pub fn validate_content(content: &Value) -> Result<(), ArticleError> {
    if content.get("blocks").is_some_and(Value::is_array) {
        Ok(())
    } else {
        Err(ArticleError::Invalid("Invalid content structure. Expected RichContent with blocks array."))
    }
}

/// Require a replacement block to carry `id` and `elements`.
///
/// # Errors
///
/// Returns [`ArticleError::Invalid`] otherwise.
pub fn validate_block(block: &Value) -> Result<(), ArticleError> {
    let has_id = block.get("id").is_some_and(|id| id.as_str().is_some_and(|s| !s.is_empty()));
    let has_elements = block.get("elements").is_some_and(|e| !e.is_null());
    if has_id && has_elements {
        Ok(())
    } else {
        Err(ArticleError::Invalid("Invalid block structure provided"))
    }
}

/// Replace the block whose `id` equals `block_id`, keeping every other key
/// of `content` (such as `version`).
///
/// # Errors
///
/// Returns [`ArticleError::Invalid`] when `content` has no `blocks` array and
/// [`ArticleError::BlockNotFound`] when no block matches.
pub fn replace_block(content: &mut Value, block_id: &str, block: Value) -> Result<(), ArticleError> {
    let Some(blocks) = content.get_mut("blocks").and_then(Value::as_array_mut) else {
        return Err(ArticleError::Invalid("Article content structure is invalid"));
    };
    let slot = blocks
        .iter_mut()
        .find(|b| b.get("id").and_then(Value::as_str) == Some(block_id))
        .ok_or(ArticleError::BlockNotFound)?;
    *slot = block;
    Ok(())
}

// =============================================================================
// QUERIES
// =============================================================================

const ARTICLE_COLUMNS: &str = "id, title, description, content, author_id, is_public, created_at, updated_at";

/// Load the ownership facts for an article.
///
/// # Errors
///
/// Returns [`ArticleError::NotFound`] or a database error.
pub async fn access(pool: &PgPool, article_id: Uuid) -> Result<ArticleAccess, ArticleError> {
    let row = sqlx::query_as::<_, (Uuid, bool)>("SELECT author_id, is_public FROM articles WHERE id = $1")
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ArticleError::NotFound)?;
    Ok(ArticleAccess { author_id: row.0, is_public: row.1 })
}

/// One page of the author's articles, newest first.
///
/// # Errors
///
/// Returns a database error if a query fails.
pub async fn list_articles(
    pool: &PgPool,
    author_id: Uuid,
    page: i64,
) -> Result<(Vec<ArticleDetail>, Pagination), ArticleError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;
    let pagination = Pagination::new(page, total);

    let articles = sqlx::query_as::<_, Article>(&format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles WHERE author_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(author_id)
    .bind(PAGE_SIZE)
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    let mut details = Vec::with_capacity(articles.len());
    for article in articles {
        details.push(attach_relations(pool, article, annotation::Order::Oldest).await?);
    }
    Ok((details, pagination))
}

/// Fetch one article with annotations newest first and images oldest first.
///
/// # Errors
///
/// Returns [`ArticleError::NotFound`] or a database error.
pub async fn get_article(pool: &PgPool, article_id: Uuid) -> Result<ArticleDetail, ArticleError> {
    let article = fetch_article(pool, article_id).await?;
    attach_relations(pool, article, annotation::Order::Newest).await
}

async fn fetch_article(pool: &PgPool, article_id: Uuid) -> Result<Article, ArticleError> {
    sqlx::query_as::<_, Article>(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"))
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ArticleError::NotFound)
}

async fn attach_relations(
    pool: &PgPool,
    article: Article,
    annotation_order: annotation::Order,
) -> Result<ArticleDetail, ArticleError> {
    let author = sqlx::query_as::<_, Author>("SELECT id, name, username FROM users WHERE id = $1")
        .bind(article.author_id)
        .fetch_one(pool)
        .await?;
    let annotations = annotation::list_for_article(pool, article.id, None, None, annotation_order).await?;
    let generated_images = image::list_for_article(pool, article.id).await?;
    Ok(ArticleDetail { article, author, annotations, generated_images })
}

pub struct NewArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Value,
    pub is_public: bool,
}

/// Insert an article owned by `author_id`.
///
/// # Errors
///
/// Returns [`ArticleError::Invalid`] for content without a `blocks` array, or
/// a database error.
pub async fn create_article(pool: &PgPool, author_id: Uuid, input: NewArticle) -> Result<ArticleDetail, ArticleError> {
    validate_content(&input.content)?;
    let article = sqlx::query_as::<_, Article>(&format!(
        "INSERT INTO articles (title, description, content, author_id, is_public)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {ARTICLE_COLUMNS}"
    ))
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.content)
    .bind(author_id)
    .bind(input.is_public)
    .fetch_one(pool)
    .await?;
    tracing::info!(article_id = %article.id, %author_id, "article created");
    attach_relations(pool, article, annotation::Order::Newest).await
}

/// Field-wise patch; `None` leaves a column unchanged.
#[derive(Debug, Default)]
pub struct ArticlePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<Value>,
    pub is_public: Option<bool>,
}

/// Update an article owned by `user_id`.
///
/// # Errors
///
/// Returns not-found, forbidden, invalid-content or database errors.
pub async fn update_article(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    patch: ArticlePatch,
) -> Result<Article, ArticleError> {
    access(pool, article_id).await?.require_owner(user_id, "update")?;
    if let Some(content) = &patch.content {
        validate_content(content)?;
    }
    let article = sqlx::query_as::<_, Article>(&format!(
        "UPDATE articles SET
             title = COALESCE($2, title),
             description = COALESCE($3, description),
             content = COALESCE($4, content),
             is_public = COALESCE($5, is_public),
             updated_at = now()
         WHERE id = $1
         RETURNING {ARTICLE_COLUMNS}"
    ))
    .bind(article_id)
    .bind(&patch.title)
    .bind(&patch.description)
    .bind(&patch.content)
    .bind(patch.is_public)
    .fetch_one(pool)
    .await?;
    Ok(article)
}

/// Delete an article owned by `user_id`. Paragraphs, sentences, annotations
/// and images cascade.
///
/// # Errors
///
/// Returns not-found, forbidden or database errors.
pub async fn delete_article(pool: &PgPool, user_id: Uuid, article_id: Uuid) -> Result<(), ArticleError> {
    access(pool, article_id).await?.require_owner(user_id, "delete")?;
    sqlx::query("DELETE FROM articles WHERE id = $1")
        .bind(article_id)
        .execute(pool)
        .await?;
    tracing::info!(%article_id, "article deleted");
    Ok(())
}

/// Replace one content block of an article owned by `user_id`.
///
/// # Errors
///
/// Returns invalid-block, not-found, forbidden, block-not-found or database errors.
pub async fn update_block(
    pool: &PgPool,
    user_id: Uuid,
    article_id: Uuid,
    block_id: &str,
    block: Value,
) -> Result<Article, ArticleError> {
    validate_block(&block)?;
    let mut article = fetch_article(pool, article_id).await?;
    if article.author_id != user_id {
        return Err(ArticleError::Forbidden("modify"));
    }
    replace_block(&mut article.content, block_id, block)?;

    let updated = sqlx::query_as::<_, Article>(&format!(
        "UPDATE articles SET content = $2, updated_at = now() WHERE id = $1 RETURNING {ARTICLE_COLUMNS}"
    ))
    .bind(article_id)
    .bind(&article.content)
    .fetch_one(pool)
    .await?;
    Ok(updated)
}

#[cfg(test)]
#[path = "article_test.rs"]
mod tests;
