//! Request helpers shared by the route tests.

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tower::util::ServiceExt;

/// Build a request with an optional JSON body and `access_token` cookie.
pub fn request(method: Method, uri: &str, body: Option<&Value>, access_token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = access_token {
        builder = builder.header(header::COOKIE, format!("access_token={token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send one request through `app` and return status, headers and raw body.
pub async fn send_raw(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, String) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Send one request and parse the body as JSON.
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send_raw(app, req).await;
    let json = if body.is_empty() { Value::Null } else { serde_json::from_str(&body).unwrap() };
    (status, json)
}

/// All `Set-Cookie` header values.
pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_owned))
        .collect()
}

#[cfg(feature = "live-db-tests")]
pub mod live {
    use std::sync::Arc;

    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::llm::TextModel;
    use crate::services::article::{self, NewArticle};
    use crate::services::session;
    use crate::state::test_helpers::TEST_REGISTER_CODE;
    use crate::state::{AppState, AuthSettings};

    pub async fn pool() -> PgPool {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL required for live-db-tests");
        crate::db::init_pool(&url).await.expect("test database init failed")
    }

    pub fn state(pool: PgPool, llm: Option<Arc<dyn TextModel>>) -> AppState {
        let auth = AuthSettings { register_code: Some(TEST_REGISTER_CODE.into()), cookie_secure: false };
        AppState::new(pool, llm, None, auth)
    }

    /// Insert a user with `role` and return its id and an access token.
    pub async fn user(pool: &PgPool, role: &str) -> (Uuid, String) {
        let username = format!("u-{}", Uuid::new_v4());
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (username, name, password_hash, role)
             VALUES ($1, 'Test', 'x', $2) RETURNING id",
        )
        .bind(&username)
        .bind(role)
        .fetch_one(pool)
        .await
        .unwrap();
        let tokens = session::issue_tokens(pool, id).await.unwrap();
        (id, tokens.access_token)
    }

    pub async fn article(pool: &PgPool, author_id: Uuid, is_public: bool) -> Uuid {
        let input = NewArticle {
            title: "Reading".into(),
            description: None,
            content: serde_json::json!({ "version": 1, "blocks": [{ "id": "b1", "elements": [] }] }),
            is_public,
        };
        article::create_article(pool, author_id, input).await.unwrap().article.id
    }
}
