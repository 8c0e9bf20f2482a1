//! Account service: registration, password login, forced password change.
//!
//! Passwords are stored as bcrypt hashes (cost 12, salt embedded in the
//! hash). Hashing runs on the blocking pool.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::session::{self, TokenPair};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Mã đăng ký không hợp lệ")]
    InvalidRegisterCode,
    #[error("Tên đăng nhập này đã được sử dụng")]
    UsernameTaken,
    #[error("Tài khoản không tồn tại")]
    UnknownUser,
    #[error("Tài khoản hoặc mật khẩu không chính xác")]
    WrongPassword,
    #[error("Người dùng không tồn tại")]
    UserNotFound,
    #[error("Không cần thay đổi mật khẩu")]
    PasswordChangeNotRequired,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Public profile returned by register and login.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub username: String,
    pub name: String,
}

// =============================================================================
// PASSWORDS
// =============================================================================

/// bcrypt work factor for stored passwords.
pub const BCRYPT_COST: u32 = 12;

/// bcrypt hash of `password`, computed off the async runtime.
///
/// # Errors
///
/// Returns [`AuthError::Hash`] if hashing fails or the blocking task dies.
pub async fn hash_password(password: &str) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check `password` against a stored bcrypt hash. A malformed stored hash
/// never matches.
///
/// # Errors
///
/// Returns [`AuthError::Hash`] if the blocking task dies.
pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    tokio::task::spawn_blocking(move || match bcrypt::verify(password, &stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            false
        }
    })
    .await
    .map_err(|e| AuthError::Hash(e.to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// =============================================================================
// ACCOUNT FLOWS
// =============================================================================

/// Input to [`register`], already shape-validated.
pub struct Registration<'a> {
    pub name: &'a str,
    pub username: &'a str,
    pub register_code: &'a str,
    pub password: &'a str,
}

/// Create an account that must change its password on first use.
///
/// `expected_code` is the configured registration secret; `None` rejects
/// every attempt.
pub async fn register(
    pool: &PgPool,
    input: &Registration<'_>,
    expected_code: Option<&str>,
) -> Result<(AccountSummary, TokenPair), AuthError> {
    if expected_code.is_none_or(|code| !constant_time_eq(code.as_bytes(), input.register_code.as_bytes())) {
        return Err(AuthError::InvalidRegisterCode);
    }

    let hash = hash_password(input.password).await?;
    let row = sqlx::query(
        r"INSERT INTO users (username, name, password_hash, need_change_password)
          VALUES ($1, $2, $3, TRUE)
          ON CONFLICT (username) DO NOTHING
          RETURNING id, username, name",
    )
    .bind(input.username)
    .bind(input.name)
    .bind(&hash)
    .fetch_optional(pool)
    .await?
    .ok_or(AuthError::UsernameTaken)?;

    let account = AccountSummary { id: row.get("id"), username: row.get("username"), name: row.get("name") };
    let tokens = session::issue_tokens(pool, account.id).await?;
    tracing::info!(user_id = %account.id, username = %account.username, "user registered");
    Ok((account, tokens))
}

/// Check credentials and issue a token pair.
pub async fn login(pool: &PgPool, username: &str, password: &str) -> Result<(AccountSummary, TokenPair), AuthError> {
    let row = sqlx::query("SELECT id, username, name, password_hash FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::UnknownUser)?;

    let hash: String = row.get("password_hash");
    if !verify_password(password, &hash).await? {
        return Err(AuthError::WrongPassword);
    }

    let account = AccountSummary { id: row.get("id"), username: row.get("username"), name: row.get("name") };
    let tokens = session::issue_tokens(pool, account.id).await?;
    Ok((account, tokens))
}

/// Replace the password of a user whose account is flagged for a change.
pub async fn change_required_password(pool: &PgPool, user_id: Uuid, password: &str) -> Result<TokenPair, AuthError> {
    let row = sqlx::query("SELECT need_change_password FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    let needs_change: bool = row.get("need_change_password");
    if !needs_change {
        return Err(AuthError::PasswordChangeNotRequired);
    }

    let hash = hash_password(password).await?;
    sqlx::query("UPDATE users SET password_hash = $2, need_change_password = FALSE WHERE id = $1")
        .bind(user_id)
        .bind(&hash)
        .execute(pool)
    .await?;

    tracing::info!(%user_id, "password changed");
    Ok(session::issue_tokens(pool, user_id).await?)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
