//! Router assembly and the shared JSON error type.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every endpoint lives under `/api`, plus `/healthz` for probes. Handlers
//! return `Result<_, ApiError>`; service errors convert into `ApiError` with
//! the status and JSON body the client expects.
//!
//! TRADE-OFFS
//! ==========
//! Error bodies are not uniform across endpoint families (`{message}`,
//! `{error, field}`, `{success, error, code}`), so `ApiError` carries a raw
//! JSON body instead of a fixed struct.

pub mod ai;
pub mod annotations;
pub mod articles;
pub mod auth;
pub mod gemini;
pub mod images;
pub mod paragraphs;

#[cfg(test)]
pub(crate) mod test_support;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::rate_limit::RateLimitError;
use crate::services::annotation::AnnotationError;
use crate::services::article::ArticleError;
use crate::services::auth::AuthError;
use crate::services::image::ImageError;
use crate::services::paragraph::ParagraphError;
use crate::services::root_analysis::RootAnalysisError;
use crate::state::AppState;
use crate::validation::ValidationError;

// =============================================================================
// ROUTER
// =============================================================================

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/need-change-password", post(auth::need_change_password))
        .route("/api/articles", get(articles::list_articles).post(articles::create_article))
        .route(
            "/api/articles/{id}",
            get(articles::get_article)
                .put(articles::update_article)
                .delete(articles::delete_article),
        )
        .route("/api/articles/{id}/blocks/{block_id}", put(articles::update_block))
        .route(
            "/api/articles/{id}/paragraphs",
            get(paragraphs::list_paragraphs).post(paragraphs::create_paragraph),
        )
        .route(
            "/api/articles/{id}/paragraphs/{paragraph_id}",
            get(paragraphs::get_paragraph)
                .put(paragraphs::update_paragraph)
                .delete(paragraphs::delete_paragraph),
        )
        .route(
            "/api/articles/{id}/annotations",
            get(annotations::list_annotations)
                .post(annotations::create_annotation)
                .delete(annotations::delete_annotations),
        )
        .route("/api/articles/{id}/annotations/retry", post(annotations::retry_annotation))
        .route("/api/articles/{id}/annotations/root", post(annotations::create_root_annotation))
        .route("/api/articles/{id}/wordroot", post(annotations::analyze_word_root))
        .route("/api/articles/{id}/grammar", post(ai::grammar))
        .route("/api/articles/{id}/explain", post(ai::explain))
        .route("/api/articles/{id}/translate", post(ai::translate))
        .route("/api/articles/{id}/chat", post(ai::chat))
        .route("/api/gemini", post(gemini::generate))
        .route("/api/generate-paragraph-image", post(images::generate_paragraph_image))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// API ERROR
// =============================================================================

/// A status code with a JSON body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// `{ "message": ... }`
    #[must_use]
    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, json!({ "message": message.into() }))
    }

    /// `{ "message": ..., "details": [...] }`
    #[must_use]
    pub fn with_details(status: StatusCode, message: impl Into<String>, details: Vec<String>) -> Self {
        Self::new(status, json!({ "message": message.into(), "details": details }))
    }

    /// `{ "error": ..., "field": ... }` from the first issue by field path.
    #[must_use]
    pub fn first_issue(err: &ValidationError) -> Self {
        match err.first() {
            Some(issue) => Self::new(StatusCode::BAD_REQUEST, json!({ "error": issue.message, "field": issue.path })),
            None => Self::new(StatusCode::BAD_REQUEST, json!({ "error": "Validation failed", "field": "unknown" })),
        }
    }

    /// `{ "message": "Invalid request data", "errors": [...] }`
    #[must_use]
    pub fn invalid_request(err: &ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!({ "message": "Invalid request data", "errors": err.issues }))
    }

    /// Log `err` and answer a generic 500.
    pub fn internal(err: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal server error");
        Self::message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(&err)
    }
}

impl From<ArticleError> for ApiError {
    fn from(err: ArticleError) -> Self {
        let status = match &err {
            ArticleError::NotFound | ArticleError::BlockNotFound => StatusCode::NOT_FOUND,
            ArticleError::Forbidden(_) | ArticleError::NoAccess => StatusCode::FORBIDDEN,
            ArticleError::Invalid(_) => StatusCode::BAD_REQUEST,
            ArticleError::Database(e) => return Self::internal(e),
        };
        Self::message(status, err.to_string())
    }
}

impl From<ParagraphError> for ApiError {
    fn from(err: ParagraphError) -> Self {
        let status = match &err {
            ParagraphError::ArticleNotFound | ParagraphError::NotFound | ParagraphError::SentenceNotFound => {
                StatusCode::NOT_FOUND
            }
            ParagraphError::Forbidden(_) => StatusCode::FORBIDDEN,
            ParagraphError::Invalid(_) => StatusCode::BAD_REQUEST,
            ParagraphError::Database(e) => return Self::internal(e),
        };
        Self::message(status, err.to_string())
    }
}

impl From<AnnotationError> for ApiError {
    fn from(err: AnnotationError) -> Self {
        let status = match &err {
            AnnotationError::ArticleNotFound | AnnotationError::SentenceNotFound => StatusCode::NOT_FOUND,
            AnnotationError::Forbidden(_) | AnnotationError::RetryForbidden => StatusCode::FORBIDDEN,
            AnnotationError::Invalid(_) => StatusCode::BAD_REQUEST,
            AnnotationError::Llm(e) => {
                tracing::error!(error = %e, "annotation model call failed");
                return Self::message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retry annotation");
            }
            AnnotationError::Database(e) => return Self::internal(e),
        };
        Self::message(status, err.to_string())
    }
}

impl From<RootAnalysisError> for ApiError {
    fn from(err: RootAnalysisError) -> Self {
        let status = match &err {
            RootAnalysisError::Unavailable(e) => {
                tracing::error!(error = %e, "root analysis provider unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => {
                tracing::error!(error = %err, details = ?err.details(), "root analysis rejected model output");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::with_details(status, err.to_string(), err.details())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::InvalidRegisterCode => StatusCode::FORBIDDEN,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::UnknownUser | AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::WrongPassword => StatusCode::UNAUTHORIZED,
            AuthError::PasswordChangeNotRequired => StatusCode::BAD_REQUEST,
            AuthError::Hash(e) => return Self::internal(e),
            AuthError::Db(e) => return Self::internal(e),
        };
        Self::message(status, err.to_string())
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        let status = match &err {
            ImageError::ParagraphNotFound => StatusCode::NOT_FOUND,
            ImageError::PromptOptimization(e) | ImageError::Generation(e) => {
                tracing::error!(error = %e, "image model call failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ImageError::Upload(e) => {
                tracing::error!(error = %e, "image upload failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ImageError::Save(e) | ImageError::Database(e) => {
                tracing::error!(error = %e, "image record failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        image_failure(status, &err.to_string(), err.code())
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        Self::message(StatusCode::TOO_MANY_REQUESTS, err.to_string())
    }
}

/// `{ "success": false, "error": ..., "code": ... }`
#[must_use]
pub fn image_failure(status: StatusCode, error: &str, code: &str) -> ApiError {
    ApiError::new(status, json!({ "success": false, "error": error, "code": code }))
}

// =============================================================================
// JSON BODY
// =============================================================================

/// `Json<T>` whose rejection is a JSON 400 instead of plain text.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(&rejection)),
        }
    }
}

fn json_rejection(rejection: &JsonRejection) -> ApiError {
    tracing::debug!(error = %rejection.body_text(), "request body rejected");
    ApiError::message(StatusCode::BAD_REQUEST, "Invalid request body")
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
