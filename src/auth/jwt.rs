//! Access and refresh tokens
//!
//! Both are HS256 JWTs signed with separate secrets:
//! - access tokens carry the denormalized profile and are verified by
//!   signature and expiry alone
//! - refresh tokens carry only the identity id and are valid only while they
//!   equal the value persisted on the identity
//!
//! Each token gets a random `jti`, so two pairs minted for the same identity
//! in the same second still differ.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bson::oid::ObjectId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::db::schemas::PublicUser;
use crate::store::CredentialStore;
use crate::types::{AppError, Result};

/// Secrets and lifetimes, fixed at startup
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_expiry_seconds: u64,
    pub refresh_secret: String,
    pub refresh_expiry_seconds: u64,
}

/// Access token payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Identity id (hex)
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// Refresh token payload: the id and nothing else
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshClaims {
    #[serde(rename = "_id")]
    pub id: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// A freshly minted access/refresh pair
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Mints, verifies and rotates token pairs
pub struct TokenService {
    access: SigningKeys,
    refresh: SigningKeys,
    access_expiry_seconds: u64,
    refresh_expiry_seconds: u64,
    store: Arc<dyn CredentialStore>,
}

impl TokenService {
    pub fn new(config: &TokenConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            access: SigningKeys::from_secret(&config.access_secret),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            access_expiry_seconds: config.access_expiry_seconds,
            refresh_expiry_seconds: config.refresh_expiry_seconds,
            store,
        }
    }

    pub fn access_expiry_seconds(&self) -> u64 {
        self.access_expiry_seconds
    }

    pub fn refresh_expiry_seconds(&self) -> u64 {
        self.refresh_expiry_seconds
    }

    /// Sign a new pair for `identity`. Nothing is persisted.
    pub fn issue_token_pair(&self, identity: &PublicUser) -> Result<TokenPair> {
        let now = unix_now()?;
        let id = identity.id.to_hex();

        let access = AccessClaims {
            id: id.clone(),
            email: identity.email.clone(),
            username: identity.username.clone(),
            full_name: identity.full_name.clone(),
            iat: now,
            exp: now + self.access_expiry_seconds,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let refresh = RefreshClaims {
            id,
            iat: now,
            exp: now + self.refresh_expiry_seconds,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        Ok(TokenPair {
            access_token: encode(&Header::new(Algorithm::HS256), &access, &self.access.encoding)?,
            refresh_token: encode(
                &Header::new(Algorithm::HS256),
                &refresh,
                &self.refresh.encoding,
            )?,
        })
    }

    /// Signature and expiry only; never touches the store
    pub fn verify_access(&self, token: &str) -> Result<ObjectId> {
        let claims: AccessClaims = verify(token, &self.access.decoding, "Invalid access token")?;
        parse_identity(&claims.id, "Invalid access token")
    }

    /// Signature and expiry only. The caller must still compare the token with
    /// the persisted value.
    pub fn verify_refresh(&self, token: &str) -> Result<ObjectId> {
        let claims: RefreshClaims =
            verify(token, &self.refresh.decoding, "Invalid refresh token")?;
        parse_identity(&claims.id, "Invalid refresh token")
    }

    /// Issue a new pair and persist its refresh token, overwriting the
    /// previous one in a single write.
    ///
    /// If the write fails the previously stored token is left in place.
    pub async fn rotate(&self, identity: &PublicUser) -> Result<TokenPair> {
        let pair = self.issue_token_pair(identity)?;

        let stored = self
            .store
            .set_refresh_token(&identity.id, Some(&pair.refresh_token))
            .await?;
        if !stored {
            return Err(AppError::not_found("User does not exist"));
        }

        debug!(user_id = %identity.id, "Refresh token rotated");
        Ok(pair)
    }
}

fn verify<C: DeserializeOwned>(token: &str, key: &DecodingKey, rejected: &str) -> Result<C> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<C>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AppError::unauthorized("Token expired"),
            _ => AppError::unauthorized(rejected),
        })
}

fn parse_identity(hex: &str, rejected: &str) -> Result<ObjectId> {
    ObjectId::parse_str(hex).map_err(|_| AppError::unauthorized(rejected))
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AppError::Internal(format!("System time error: {}", e)))
}

/// Extract token from an `Authorization: Bearer <token>` header value
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::UserDoc;
    use crate::store::MemoryStore;

    fn config() -> TokenConfig {
        TokenConfig {
            access_secret: "access-secret-that-is-at-least-32-characters".into(),
            access_expiry_seconds: 3600,
            refresh_secret: "refresh-secret-that-is-at-least-32-characters".into(),
            refresh_expiry_seconds: 86400,
        }
    }

    async fn service_with_user() -> (TokenService, Arc<MemoryStore>, PublicUser) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_identity(UserDoc::new(
                "bob",
                "bob@example.com",
                "Bob",
                "$argon2id$fake".into(),
                "https://media.example/a.png".into(),
                None,
            ))
            .await
            .unwrap();
        let service = TokenService::new(&config(), store.clone());
        (service, store, user.to_public())
    }

    fn sign<C: Serialize>(claims: &C, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_issue_then_verify_round_trip() {
        let (service, _, user) = service_with_user().await;
        let pair = service.issue_token_pair(&user).unwrap();

        assert_eq!(service.verify_access(&pair.access_token).unwrap(), user.id);
        assert_eq!(service.verify_refresh(&pair.refresh_token).unwrap(), user.id);
    }

    #[tokio::test]
    async fn test_tokens_are_not_interchangeable() {
        let (service, _, user) = service_with_user().await;
        let pair = service.issue_token_pair(&user).unwrap();

        assert!(matches!(
            service.verify_access(&pair.refresh_token),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            service.verify_refresh(&pair.access_token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_payload_is_id_only() {
        let (service, _, user) = service_with_user().await;
        let pair = service.issue_token_pair(&user).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        let raw = decode::<serde_json::Value>(
            &pair.refresh_token,
            &DecodingKey::from_secret(config().refresh_secret.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims;

        let mut keys: Vec<&str> = raw.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["_id", "exp", "iat", "jti"]);
    }

    #[tokio::test]
    async fn test_expired_access_token_rejected() {
        let (service, _, user) = service_with_user().await;
        let now = unix_now().unwrap();
        let claims = AccessClaims {
            id: user.id.to_hex(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat: now - 7200,
            exp: now - 3600,
            jti: "x".into(),
        };
        let token = sign(&claims, &config().access_secret);

        let err = service.verify_access(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Token expired"));
    }

    #[tokio::test]
    async fn test_garbage_and_foreign_tokens_rejected() {
        let (service, _, user) = service_with_user().await;
        assert!(service.verify_access("not-a-token").is_err());

        let now = unix_now().unwrap();
        let forged = RefreshClaims {
            id: user.id.to_hex(),
            iat: now,
            exp: now + 60,
            jti: "x".into(),
        };
        let token = sign(&forged, "some-other-secret-of-sufficient-length!!");
        assert!(matches!(
            service.verify_refresh(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_rotate_overwrites_persisted_token() {
        let (service, store, user) = service_with_user().await;

        let first = service.rotate(&user).await.unwrap();
        let second = service.rotate(&user).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(second.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn test_rotate_for_missing_identity() {
        let (service, _, mut user) = service_with_user().await;
        user.id = ObjectId::new();
        assert!(matches!(
            service.rotate(&user).await,
            Err(AppError::NotFound(ref m)) if m == "User does not exist"
        ));
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
        assert_eq!(extract_token_from_header(Some("abc123")), None);
    }
}
