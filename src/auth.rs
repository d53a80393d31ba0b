//! Token-based authentication. Tokens are opaque random strings held in a
//! process-wide map with an expiry; verification is a lookup plus expiry
//! check. The same path authenticates HTTP requests (Authorization header)
//! and sync-channel connections (the `auth` wire message).

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::User;

const TOKEN_LENGTH: usize = 48;
const TOKEN_TTL_DAYS: i64 = 7;

pub type TokenMap = Arc<RwLock<HashMap<String, TokenEntry>>>;

#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// The identity a verified token resolves to.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
}

pub fn new_token_map() -> TokenMap {
    Arc::new(RwLock::new(HashMap::new()))
}

pub async fn issue_token(tokens: &TokenMap, user: &User) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();

    tokens.write().await.insert(
        token.clone(),
        TokenEntry {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            expires_at: Utc::now() + Duration::days(TOKEN_TTL_DAYS),
        },
    );
    token
}

pub async fn verify_token(tokens: &TokenMap, token: &str) -> Result<AuthUser, ApiError> {
    let expired = {
        let map = tokens.read().await;
        match map.get(token) {
            Some(entry) if entry.expires_at > Utc::now() => {
                return Ok(AuthUser {
                    user_id: entry.user_id,
                    username: entry.username.clone(),
                    email: entry.email.clone(),
                });
            }
            Some(_) => true,
            None => false,
        }
    };

    // Evict on touch so the map does not accumulate stale entries.
    if expired {
        tokens.write().await.remove(token);
        return Err(ApiError::Authentication("token expired".into()));
    }
    Err(ApiError::Authentication("invalid token".into()))
}

pub async fn revoke_token(tokens: &TokenMap, token: &str) {
    tokens.write().await.remove(token);
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the caller from the Authorization header.
pub async fn authenticate(headers: &HeaderMap, tokens: &TokenMap) -> Result<AuthUser, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Authentication("missing bearer token".into()))?;
    verify_token(tokens, token).await
}

pub async fn hash_password(password: &str) -> Result<String, ApiError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|err| ApiError::Internal(format!("hash task failed: {err}")))?
        .map_err(|err| ApiError::Internal(format!("bcrypt failure: {err}")))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| ApiError::Internal(format!("verify task failed: {err}")))?
        .map_err(|err| ApiError::Internal(format!("bcrypt failure: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "franz".to_string(),
            email: "franz@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn issued_tokens_verify_to_their_user() {
        let tokens = new_token_map();
        let user = test_user();

        let token = issue_token(&tokens, &user).await;
        assert_eq!(token.len(), TOKEN_LENGTH);

        let auth = verify_token(&tokens, &token).await.unwrap();
        assert_eq!(auth.user_id, user.id);
        assert_eq!(auth.username, "franz");
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected() {
        let tokens = new_token_map();
        let err = verify_token(&tokens, "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected_and_evicted() {
        let tokens = new_token_map();
        tokens.write().await.insert(
            "stale".to_string(),
            TokenEntry {
                user_id: Uuid::new_v4(),
                username: "franz".to_string(),
                email: "franz@example.com".to_string(),
                expires_at: Utc::now() - Duration::days(1),
            },
        );

        let err = verify_token(&tokens, "stale").await.unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
        assert!(!tokens.read().await.contains_key("stale"));
    }

    #[tokio::test]
    async fn revoked_tokens_stop_verifying() {
        let tokens = new_token_map();
        let token = issue_token(&tokens, &test_user()).await;

        revoke_token(&tokens, &token).await;
        assert!(verify_token(&tokens, &token).await.is_err());
    }

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
