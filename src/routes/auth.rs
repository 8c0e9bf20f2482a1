//! Auth routes: registration, login, token refresh, forced password change.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use time::Duration;

use super::{ApiError, JsonBody};
use crate::services::auth::{self as auth_svc, AccountSummary, Registration};
use crate::services::session::{self, ACCESS_TOKEN_TTL_MINUTES, REFRESH_TOKEN_TTL_DAYS, TokenPair};
use crate::state::AppState;
use crate::validation::Validator;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the `access_token` cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

/// 401 telling the client to call `/api/auth/refresh` and retry.
#[must_use]
pub fn unauthorized() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, json!({ "message": "Unauthorized", "code": "TRY_REFRESH_TOKEN" }))
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(ACCESS_COOKIE).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(unauthorized());
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, token)
            .await?
            .ok_or_else(unauthorized)?;

        Ok(Self { user, token: token.to_owned() })
    }
}

// =============================================================================
// COOKIES
// =============================================================================

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

fn with_token_cookies(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(auth_cookie(
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        Duration::minutes(ACCESS_TOKEN_TTL_MINUTES.into()),
        secure,
    ))
    .add(auth_cookie(
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        Duration::days(REFRESH_TOKEN_TTL_DAYS.into()),
        secure,
    ))
}

fn without_token_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(auth_cookie(ACCESS_COOKIE, String::new(), Duration::ZERO, secure))
        .add(auth_cookie(REFRESH_COOKIE, String::new(), Duration::ZERO, secure))
}

fn account_body(message: &str, account: &AccountSummary, tokens: &TokenPair) -> serde_json::Value {
    json!({
        "message": message,
        "user": account,
        "accessToken": tokens.access_token,
        "refreshToken": tokens.refresh_token,
    })
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    name: Option<String>,
    username: Option<String>,
    register_code: Option<String>,
    password: Option<String>,
}

/// `POST /api/auth/register`: create an account flagged for a password change.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterBody>,
) -> Result<Response, ApiError> {
    Validator::new()
        .min_chars("name", body.name.as_deref(), 2, "Tên phải có ít nhất 2 ký tự.")
        .min_chars("username", body.username.as_deref(), 2, "Tên đăng nhập phải có ít nhất 2 ký tự.")
        .min_chars("registerCode", body.register_code.as_deref(), 1, "Mã đăng ký là bắt buộc.")
        .min_chars("password", body.password.as_deref(), 3, "Mật khẩu phải có ít nhất 3 ký tự.")
        .finish()
        .map_err(|e| ApiError::first_issue(&e))?;

    let input = Registration {
        name: body.name.as_deref().unwrap_or_default(),
        username: body.username.as_deref().unwrap_or_default(),
        register_code: body.register_code.as_deref().unwrap_or_default(),
        password: body.password.as_deref().unwrap_or_default(),
    };
    let (account, tokens) = auth_svc::register(&state.pool, &input, state.auth.register_code.as_deref()).await?;

    Ok((StatusCode::CREATED, Json(account_body("Đăng ký thành công", &account, &tokens))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    username: Option<String>,
    password: Option<String>,
}

/// `POST /api/auth/login`: check credentials and set both token cookies.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<LoginBody>,
) -> Result<Response, ApiError> {
    Validator::new()
        .min_chars("username", body.username.as_deref(), 2, "Tên đăng nhập phải có ít nhất 2 ký tự.")
        .min_chars("password", body.password.as_deref(), 3, "Mật khẩu phải có ít nhất 3 ký tự.")
        .finish()
        .map_err(|e| ApiError::first_issue(&e))?;

    let username = body.username.as_deref().unwrap_or_default();
    let password = body.password.as_deref().unwrap_or_default();
    let (account, tokens) = auth_svc::login(&state.pool, username, password).await?;
    tracing::info!(user_id = %account.id, "user logged in");

    let jar = with_token_cookies(jar, &tokens, state.auth.cookie_secure);
    Ok((jar, Json(account_body("Đăng nhập thành công", &account, &tokens))).into_response())
}

/// `POST /api/auth/logout`: revoke the refresh token and expire both cookies.
///
/// Succeeds without a valid session so a stale client can always sign out.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, ApiError> {
    let token = jar.get(ACCESS_COOKIE).map(Cookie::value).unwrap_or_default().to_owned();
    if !token.is_empty() {
        if let Some(user) = session::validate_session(&state.pool, &token).await? {
            session::revoke_refresh_token(&state.pool, user.id).await?;
            tracing::info!(user_id = %user.id, "user logged out");
        }
        session::delete_session(&state.pool, &token).await?;
    }

    let jar = without_token_cookies(jar, state.auth.cookie_secure);
    Ok((jar, Json(json!({ "message": "Đăng xuất thành công" }))).into_response())
}

/// `POST /api/auth/refresh`: rotate both tokens using the refresh cookie.
pub async fn refresh(State(state): State<AppState>, jar: CookieJar) -> Result<Response, ApiError> {
    let token = jar.get(REFRESH_COOKIE).map(Cookie::value).unwrap_or_default().to_owned();
    if token.is_empty() {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, json!({ "error": "Refresh token not found" })));
    }

    let Some(tokens) = session::refresh(&state.pool, &token).await? else {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, json!({ "error": "Invalid refresh token" })));
    };

    let jar = with_token_cookies(jar, &tokens, state.auth.cookie_secure);
    Ok((jar, Json(json!({ "success": true, "message": "Token refreshed successfully" }))).into_response())
}

/// `GET /api/auth/me`: the signed-in user.
pub async fn me(auth: AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "data": {
            "id": auth.user.id,
            "name": auth.user.name,
            "needChangePassword": auth.user.need_change_password,
            "role": auth.user.role,
        }
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    password: Option<String>,
}

/// `POST /api/auth/need-change-password`: set the first real password.
pub async fn need_change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    jar: CookieJar,
    JsonBody(body): JsonBody<ChangePasswordBody>,
) -> Result<Response, ApiError> {
    Validator::new()
        .min_chars("password", body.password.as_deref(), 3, "Mật khẩu phải có ít nhất 3 ký tự.")
        .finish()
        .map_err(|e| ApiError::first_issue(&e))?;

    let password = body.password.as_deref().unwrap_or_default();
    let tokens = auth_svc::change_required_password(&state.pool, auth.user.id, password).await?;

    let jar = with_token_cookies(jar, &tokens, state.auth.cookie_secure);
    Ok((jar, Json(json!({ "message": "Đổi mật khẩu thành công" }))).into_response())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
