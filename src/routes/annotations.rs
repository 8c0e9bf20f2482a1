//! Annotation routes: block annotations, sentence retry, root analysis.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use super::ai::{require_reader, text_model};
use super::articles::{article_id, parse_id};
use super::auth::AuthUser;
use super::{ApiError, JsonBody};
use crate::services::annotation::{self, DeleteScope, NewAnnotation, Order};
use crate::services::root_analysis;
use crate::state::AppState;
use crate::validation::{ValidationError, Validator};

// =============================================================================
// BLOCK ANNOTATIONS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    block_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// `GET /api/articles/{id}/annotations?blockId&type`: oldest first.
pub async fn list_annotations(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let article_id = require_reader(&state, auth.user.id, &id).await?;
    let annotations = annotation::list_for_article(
        &state.pool,
        article_id,
        query.block_id.as_deref(),
        query.kind.as_deref(),
        Order::Oldest,
    )
    .await?;
    Ok(Json(json!({ "data": annotations })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationBody {
    block_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    selected_text: Option<String>,
    result: Option<String>,
    span: Option<Value>,
    metadata: Option<Value>,
}

impl CreateAnnotationBody {
    fn into_new(self) -> Result<NewAnnotation, ApiError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        match (
            non_empty(self.block_id),
            non_empty(self.kind),
            non_empty(self.selected_text),
            non_empty(self.result),
            self.span.filter(|s| !s.is_null()),
        ) {
            (Some(block_id), Some(kind), Some(selected_text), Some(result), Some(span)) => Ok(NewAnnotation {
                block_id,
                kind,
                selected_text,
                result,
                span,
                root_result: None,
                metadata: metadata_or_empty(self.metadata),
            }),
            _ => Err(ApiError::message(
                StatusCode::BAD_REQUEST,
                "Missing required fields: blockId, type, selectedText, result, span",
            )),
        }
    }
}

fn metadata_or_empty(metadata: Option<Value>) -> Value {
    metadata.filter(|m| !m.is_null()).unwrap_or_else(|| json!({}))
}

/// `POST /api/articles/{id}/annotations`
pub async fn create_annotation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<CreateAnnotationBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = body.into_new()?;
    let article_id = article_id(&id)?;
    let created = annotation::create_annotation(&state.pool, auth.user.id, article_id, input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": created, "message": "Annotation created successfully" }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    annotation_id: Option<String>,
    block_id: Option<String>,
}

impl DeleteQuery {
    /// `annotationId` wins over `blockId`; neither deletes everything.
    fn scope(self) -> Result<DeleteScope, ApiError> {
        if let Some(raw) = self.annotation_id.filter(|s| !s.is_empty()) {
            return Ok(DeleteScope::One(parse_id(&raw, "Annotation not found")?));
        }
        Ok(match self.block_id.filter(|s| !s.is_empty()) {
            Some(block_id) => DeleteScope::Block(block_id),
            None => DeleteScope::All,
        })
    }
}

/// `DELETE /api/articles/{id}/annotations?annotationId|blockId`
pub async fn delete_annotations(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    let article_id = article_id(&id)?;
    let scope = query.scope()?;
    let count = annotation::delete_annotations(&state.pool, auth.user.id, article_id, scope).await?;
    Ok(Json(json!({
        "data": { "count": count, "message": format!("Deleted {count} annotation(s)") }
    })))
}

// =============================================================================
// SENTENCE RETRY
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryBody {
    sentence_id: Option<String>,
    text: Option<String>,
}

/// `POST /api/articles/{id}/annotations/retry`
pub async fn retry_annotation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(_id): Path<String>,
    JsonBody(body): JsonBody<RetryBody>,
) -> Result<Json<Value>, ApiError> {
    let (Some(sentence_id), Some(text)) =
        (body.sentence_id.filter(|s| !s.is_empty()), body.text.filter(|t| !t.is_empty()))
    else {
        return Err(ApiError::message(StatusCode::BAD_REQUEST, "SentenceId and text are required"));
    };
    let sentence_id = parse_id(&sentence_id, "Sentence not found")?;
    let llm = text_model(&state, auth.user.id)?;
    let marker = annotation::retry_sentence(&state.pool, llm.as_ref(), auth.user.id, sentence_id, &text).await?;
    Ok(Json(json!({ "success": true, "data": marker })))
}

// =============================================================================
// ROOT ANALYSIS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootAnnotationBody {
    block_id: Option<String>,
    selected_text: Option<String>,
    span: Option<Value>,
    paragraph_content: Option<String>,
    metadata: Option<Value>,
}

fn check_selection(v: &mut Validator, selected_text: Option<&str>, paragraph_content: Option<&str>) {
    v.required("selectedText", selected_text, "Selected text is required")
        .max_chars("selectedText", selected_text, 100, "Selected text must be at most 100 characters")
        .required("paragraphContent", paragraph_content, "Paragraph content is required");
}

impl RootAnnotationBody {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut v = Validator::new();
        v.required("blockId", self.block_id.as_deref(), "Block id is required");
        check_selection(&mut v, self.selected_text.as_deref(), self.paragraph_content.as_deref());
        v.check(
            self.span.as_ref().is_some_and(annotation::is_valid_span),
            "span",
            "Span must have startElement, endElement, startOffset and endOffset",
        );
        v.finish()
    }
}

/// `POST /api/articles/{id}/annotations/root`: analyse and store.
pub async fn create_root_annotation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RootAnnotationBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    body.validate().map_err(|e| ApiError::invalid_request(&e))?;
    let article_id = article_id(&id)?;
    annotation::require_annotator(&state.pool, auth.user.id, article_id).await?;
    let llm = text_model(&state, auth.user.id)?;

    let selected_text = body.selected_text.unwrap_or_default();
    let paragraph_content = body.paragraph_content.unwrap_or_default();
    let (analysis, _warnings) = root_analysis::run(llm.as_ref(), &selected_text, &paragraph_content).await?;

    let root_result = serde_json::to_value(&analysis).map_err(|e| ApiError::internal(&e))?;
    let input = NewAnnotation {
        block_id: body.block_id.unwrap_or_default(),
        kind: "root".to_owned(),
        result: format!("Root analysis: {}", analysis.vi_meaning),
        selected_text,
        span: body.span.unwrap_or(Value::Null),
        root_result: Some(root_result),
        metadata: metadata_or_empty(body.metadata),
    };
    let created = annotation::create_annotation(&state.pool, auth.user.id, article_id, input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": created, "message": "Root annotation created successfully" }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordRootBody {
    selected_text: Option<String>,
    paragraph_content: Option<String>,
}

/// `POST /api/articles/{id}/wordroot`: analyse without storing.
pub async fn analyze_word_root(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<WordRootBody>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    check_selection(&mut v, body.selected_text.as_deref(), body.paragraph_content.as_deref());
    v.finish().map_err(|e| ApiError::invalid_request(&e))?;

    require_reader(&state, auth.user.id, &id).await?;
    let llm = text_model(&state, auth.user.id)?;
    let selected_text = body.selected_text.unwrap_or_default();
    let paragraph_content = body.paragraph_content.unwrap_or_default();
    let (analysis, _warnings) = root_analysis::run(llm.as_ref(), &selected_text, &paragraph_content).await?;
    Ok(Json(json!({ "data": analysis, "message": "Root analysis completed successfully" })))
}

#[cfg(test)]
#[path = "annotations_test.rs"]
mod tests;
