//! Access sessions and refresh tokens.
//!
//! ARCHITECTURE
//! ============
//! Access tokens are opaque rows in `sessions` that expire after 30 minutes.
//! Refresh tokens live 7 days; only a SHA-256 digest of the most recently
//! issued one is stored on the user row, so issuing a new pair revokes the
//! previous refresh token.
//!
//! TRADE-OFFS
//! ==========
//! One refresh token per user means signing in on a second device signs the
//! first one out at its next refresh.

use std::fmt::Write;

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_MINUTES: i32 = 30;
pub const REFRESH_TOKEN_TTL_DAYS: i32 = 7;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Stored form of a refresh token.
#[must_use]
pub(crate) fn token_digest(token: &str) -> String {
    bytes_to_hex(&Sha256::digest(token.as_bytes()))
}

/// User row returned from session validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    /// `"user"` or `"admin"`.
    pub role: String,
    pub need_change_password: bool,
}

impl SessionUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Create an access session and a fresh refresh token for `user_id`,
/// purging the user's expired sessions.
pub async fn issue_tokens(pool: &PgPool, user_id: Uuid) -> Result<TokenPair, sqlx::Error> {
    let access_token = generate_token();
    let refresh_token = generate_token();

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at <= now()")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, now() + make_interval(mins => $3))")
        .bind(&access_token)
        .bind(user_id)
        .bind(ACCESS_TOKEN_TTL_MINUTES)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE users SET refresh_token = $2, refresh_expires_at = now() + make_interval(days => $3) WHERE id = $1",
    )
    .bind(user_id)
    .bind(token_digest(&refresh_token))
    .bind(REFRESH_TOKEN_TTL_DAYS)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(TokenPair { access_token, refresh_token })
}

/// Validate an access token and return the associated user.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT u.id, u.username, u.name, u.role, u.need_change_password
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser {
        id: r.get("id"),
        username: r.get("username"),
        name: r.get("name"),
        role: r.get("role"),
        need_change_password: r.get("need_change_password"),
    }))
}

/// Delete an access session by token.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Forget the user's refresh token and drop expired sessions.
pub async fn revoke_refresh_token(pool: &PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET refresh_token = NULL, refresh_expires_at = NULL WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND expires_at <= now()")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Exchange a valid refresh token for a new token pair.
///
/// Returns `None` when the token is unknown, superseded, or expired.
pub async fn refresh(pool: &PgPool, refresh_token: &str) -> Result<Option<TokenPair>, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM users WHERE refresh_token = $1 AND refresh_expires_at > now()")
        .bind(token_digest(refresh_token))
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let user_id: Uuid = row.get("id");
    issue_tokens(pool, user_id).await.map(Some)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
