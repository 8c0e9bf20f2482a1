use super::*;

// =============================================================================
// bytes_to_hex
// =============================================================================

#[test]
fn bytes_to_hex_empty() {
    assert_eq!(bytes_to_hex(&[]), "");
}

#[test]
fn bytes_to_hex_leading_zero() {
    assert_eq!(bytes_to_hex(&[0x0a, 0xff]), "0aff");
}

// =============================================================================
// generate_token
// =============================================================================

#[test]
fn generate_token_is_64_hex_chars() {
    let token = generate_token();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generate_token_two_calls_differ() {
    assert_ne!(generate_token(), generate_token());
}

// =============================================================================
// token_digest
// =============================================================================

#[test]
fn token_digest_is_stable_sha256() {
    assert_eq!(
        token_digest("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn token_digest_differs_from_token() {
    let token = generate_token();
    assert_ne!(token_digest(&token), token);
}

// =============================================================================
// SessionUser
// =============================================================================

fn user(role: &str) -> SessionUser {
    SessionUser {
        id: Uuid::new_v4(),
        username: "reader".into(),
        name: "Reader".into(),
        role: role.into(),
        need_change_password: true,
    }
}

#[test]
fn only_admin_role_is_admin() {
    assert!(user("admin").is_admin());
    assert!(!user("user").is_admin());
    assert!(!user("Admin").is_admin());
}

#[test]
fn session_user_serializes_camel_case() {
    let json = serde_json::to_value(user("user")).unwrap();
    assert_eq!(json["needChangePassword"], true);
    assert_eq!(json["role"], "user");
}

// =============================================================================
// DB-backed flows
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;

    async fn pool() -> PgPool {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL");
        crate::db::init_pool(&url).await.expect("pool")
    }

    async fn seed_user(pool: &PgPool) -> Uuid {
        let username = format!("u-{}", Uuid::new_v4());
        sqlx::query_scalar(
            "INSERT INTO users (username, name, password_hash) VALUES ($1, 'T', 'h') RETURNING id",
        )
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn issued_access_token_validates() {
        let pool = pool().await;
        let user_id = seed_user(&pool).await;
        let pair = issue_tokens(&pool, user_id).await.unwrap();
        let user = validate_session(&pool, &pair.access_token).await.unwrap().unwrap();
        assert_eq!(user.id, user_id);
        delete_session(&pool, &pair.access_token).await.unwrap();
        assert!(validate_session(&pool, &pair.access_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_rotates_and_revokes_previous_token() {
        let pool = pool().await;
        let user_id = seed_user(&pool).await;
        let first = issue_tokens(&pool, user_id).await.unwrap();
        let second = refresh(&pool, &first.refresh_token).await.unwrap().unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(refresh(&pool, &first.refresh_token).await.unwrap().is_none());
        revoke_refresh_token(&pool, user_id).await.unwrap();
        assert!(refresh(&pool, &second.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn issuing_tokens_purges_expired_sessions() {
        let pool = pool().await;
        let user_id = seed_user(&pool).await;
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, now() - INTERVAL '1 minute')")
            .bind(generate_token())
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        let pair = issue_tokens(&pool, user_id).await.unwrap();
        let tokens: Vec<String> = sqlx::query_scalar("SELECT token FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(tokens, vec![pair.access_token]);
    }
}
