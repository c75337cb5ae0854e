//! Per-request session gate
//!
//! Resolves the access token on a request into the identity it names. The
//! `accessToken` cookie wins over an `Authorization: Bearer` header. Nothing
//! is cached between requests, and the refresh token is never read here.

use std::sync::Arc;

use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;
use tracing::debug;

use crate::auth::cookies::{read_cookie, ACCESS_COOKIE};
use crate::auth::jwt::extract_token_from_header;
use crate::auth::TokenService;
use crate::db::schemas::PublicUser;
use crate::store::CredentialStore;
use crate::types::{AppError, Result};

/// Access token carried by a request, cookie first
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, ACCESS_COOKIE).or_else(|| {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        extract_token_from_header(header).map(str::to_string)
    })
}

pub struct SessionGate {
    tokens: Arc<TokenService>,
    store: Arc<dyn CredentialStore>,
}

impl SessionGate {
    pub fn new(tokens: Arc<TokenService>, store: Arc<dyn CredentialStore>) -> Self {
        Self { tokens, store }
    }

    /// The authenticated identity, loaded without secrets.
    ///
    /// Store failures propagate as-is so a timeout stays `Unavailable`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<PublicUser> {
        let token = extract_access_token(headers)
            .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

        let id = self.tokens.verify_access(&token)?;

        match self.store.find_public_by_id(&id).await? {
            Some(user) => Ok(user),
            None => {
                debug!(user_id = %id, "Access token names a missing identity");
                Err(AppError::unauthorized("Invalid access token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenConfig;
    use crate::db::schemas::UserDoc;
    use crate::store::testing::FaultyStore;
    use crate::store::MemoryStore;
    use hyper::header::{HeaderValue, COOKIE};

    fn tokens(store: Arc<MemoryStore>) -> Arc<TokenService> {
        let config = TokenConfig {
            access_secret: "access-secret-that-is-at-least-32-characters".into(),
            access_expiry_seconds: 3600,
            refresh_secret: "refresh-secret-that-is-at-least-32-characters".into(),
            refresh_expiry_seconds: 86400,
        };
        Arc::new(TokenService::new(&config, store))
    }

    async fn setup() -> (SessionGate, Arc<TokenService>, Arc<MemoryStore>, PublicUser) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_identity(UserDoc::new(
                "amy",
                "amy@example.com",
                "Amy",
                "$argon2id$fake".into(),
                "https://media.example/a.png".into(),
                None,
            ))
            .await
            .unwrap()
            .to_public();
        let tokens = tokens(store.clone());
        let gate = SessionGate::new(tokens.clone(), store.clone());
        (gate, tokens, store, user)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_bearer_token_resolves_identity() {
        let (gate, tokens, _, user) = setup().await;
        let pair = tokens.issue_token_pair(&user).unwrap();

        let resolved = gate.authenticate(&bearer(&pair.access_token)).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_cookie_takes_precedence() {
        let (gate, tokens, _, user) = setup().await;
        let pair = tokens.issue_token_pair(&user).unwrap();

        let mut headers = bearer("garbage");
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("accessToken={}", pair.access_token)).unwrap(),
        );
        assert_eq!(extract_access_token(&headers), Some(pair.access_token.clone()));
        assert!(gate.authenticate(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_invalid_token_rejected() {
        let (gate, _, _, _) = setup().await;

        let err = gate.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = gate.authenticate(&bearer("not.a.jwt")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (gate, tokens, _, user) = setup().await;
        let pair = tokens.issue_token_pair(&user).unwrap();

        let err = gate.authenticate(&bearer(&pair.refresh_token)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unknown_identity_rejected() {
        let (gate, tokens, _, mut user) = setup().await;
        user.id = bson::oid::ObjectId::new();
        let pair = tokens.issue_token_pair(&user).unwrap();

        let err = gate.authenticate(&bearer(&pair.access_token)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_store_timeout_is_unavailable_not_unauthorized() {
        let (_, tokens, memory, user) = setup().await;
        let store = Arc::new(FaultyStore::new(memory));
        let gate = SessionGate::new(tokens.clone(), store.clone());
        let pair = tokens.issue_token_pair(&user).unwrap();

        store.set_time_out_reads(true);
        let err = gate.authenticate(&bearer(&pair.access_token)).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert_eq!(err.status_code(), hyper::StatusCode::SERVICE_UNAVAILABLE);

        store.set_time_out_reads(false);
        assert_eq!(gate.authenticate(&bearer(&pair.access_token)).await.unwrap().id, user.id);
    }
}
