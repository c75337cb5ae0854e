//! Account and session lifecycle
//!
//! Registration, login, logout and refresh, plus the profile updates that
//! mutate an identity. Session state moves
//! `Anonymous -> Authenticated` (login), `Authenticated -> Authenticated`
//! (refresh, new pair) and back to `Anonymous` (logout).
//!
//! The persisted refresh token is only ever written through
//! `TokenService::rotate` (login, refresh) or cleared by logout, each a
//! single write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{hash_password, verify_password, TokenPair, TokenService};
use crate::db::schemas::{normalize_handle, PublicUser, UserDoc};
use crate::logging::{AuthEvent, AuthEventKind, AuthEventLog};
use crate::services::media::{MediaPayload, MediaService, UploadedMedia};
use crate::store::{CredentialStore, ProfileImage};
use crate::types::{AppError, Result};

/// `POST /users/register`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub avatar: Option<MediaPayload>,
    pub cover_image: Option<MediaPayload>,
}

/// `POST /users/login`: either identifier plus the password
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub password: String,
}

/// `POST /users/refresh-token` body, used when no cookie is sent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Omitted fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Login result; tokens also travel as cookies
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    media: Arc<MediaService>,
    audit: AuthEventLog,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        media: Arc<MediaService>,
        audit: AuthEventLog,
    ) -> Self {
        Self {
            store,
            tokens,
            media,
            audit,
        }
    }

    /// Create an identity.
    ///
    /// Media is uploaded before the record is written, so a user never exists
    /// without an avatar URL. If the insert fails, uploaded media is discarded.
    pub async fn register(&self, req: RegisterRequest) -> Result<PublicUser> {
        let fields = [&req.full_name, &req.email, &req.username, &req.password];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::bad_request("All fields are required"));
        }
        if !req.email.contains('@') {
            return Err(AppError::bad_request("email is invalid"));
        }

        let username = normalize_handle(&req.username);
        let email = normalize_handle(&req.email);
        if self
            .store
            .find_by_username_or_email(Some(&username), Some(&email))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User with this email or username already exists".into(),
            ));
        }

        let avatar_payload = req
            .avatar
            .as_ref()
            .ok_or_else(|| AppError::bad_request("Avatar file is required"))?;

        let password_hash = hash_password(&req.password).await?;

        let avatar = self.media.upload(avatar_payload).await?;
        let cover = match req.cover_image.as_ref() {
            Some(payload) => match self.media.upload(payload).await {
                Ok(uploaded) => Some(uploaded),
                Err(e) => {
                    self.media.discard(&avatar.public_id).await;
                    return Err(e);
                }
            },
            None => None,
        };

        let user = UserDoc::new(
            &username,
            &email,
            &req.full_name,
            password_hash,
            avatar.url.clone(),
            cover.as_ref().map(|c| c.url.clone()),
        );

        let created = match self.store.insert_identity(user).await {
            Ok(created) => created,
            Err(e) => {
                self.discard_all(&avatar, cover.as_ref()).await;
                return Err(e);
            }
        };

        let public = created.to_public();
        info!(user_id = %public.id, username = %public.username, "User registered");
        self.audit
            .log(AuthEvent::new(AuthEventKind::Registered).with_user(public.id))
            .await;
        Ok(public)
    }

    async fn discard_all(&self, avatar: &UploadedMedia, cover: Option<&UploadedMedia>) {
        self.media.discard(&avatar.public_id).await;
        if let Some(cover) = cover {
            self.media.discard(&cover.public_id).await;
        }
    }

    /// Verify credentials and open a session (one refresh-token write)
    pub async fn login(&self, req: LoginRequest) -> Result<Session> {
        let username = non_blank(req.username.as_deref()).map(normalize_handle);
        let email = non_blank(req.email.as_deref()).map(normalize_handle);
        if username.is_none() && email.is_none() {
            return Err(AppError::bad_request("username or email is required"));
        }
        if req.password.is_empty() {
            return Err(AppError::bad_request("password is required"));
        }

        let Some(user) = self
            .store
            .find_by_username_or_email(username.as_deref(), email.as_deref())
            .await?
        else {
            self.audit
                .log(AuthEvent::new(AuthEventKind::LoginFailed).with_reason("unknown_identity"))
                .await;
            return Err(AppError::not_found("User does not exist"));
        };

        if !verify_password(&req.password, &user.password_hash).await? {
            self.audit
                .log(
                    AuthEvent::new(AuthEventKind::LoginFailed)
                        .with_user(user.to_public().id)
                        .with_reason("bad_password"),
                )
                .await;
            return Err(AppError::unauthorized("Invalid user credentials"));
        }

        let public = user.to_public();
        let tokens = self.tokens.rotate(&public).await?;

        self.audit
            .log(AuthEvent::new(AuthEventKind::LoginSucceeded).with_user(public.id))
            .await;
        Ok(Session {
            user: public,
            tokens,
        })
    }

    /// Clear the persisted refresh token. Safe to repeat.
    pub async fn logout(&self, user: &PublicUser) -> Result<()> {
        self.store.set_refresh_token(&user.id, None).await?;
        self.audit
            .log(AuthEvent::new(AuthEventKind::LoggedOut).with_user(user.id))
            .await;
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The token must verify AND equal the persisted value; a token
    /// superseded by a later login, refresh or logout is rejected.
    pub async fn refresh(&self, incoming: Option<&str>) -> Result<TokenPair> {
        let incoming = non_blank(incoming)
            .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

        let id = match self.tokens.verify_refresh(incoming) {
            Ok(id) => id,
            Err(e) => {
                self.reject_refresh(None, "invalid").await;
                return Err(e);
            }
        };

        let Some(user) = self.store.find_by_id(&id).await? else {
            self.reject_refresh(Some(&id.to_hex()), "unknown_identity").await;
            return Err(AppError::unauthorized("Invalid refresh token"));
        };

        if user.refresh_token.as_deref() != Some(incoming) {
            self.reject_refresh(Some(&id.to_hex()), "superseded").await;
            return Err(AppError::unauthorized("Refresh token is expired or used"));
        }

        let tokens = match self.tokens.rotate(&user.to_public()).await {
            Ok(tokens) => tokens,
            Err(AppError::NotFound(_)) => {
                self.reject_refresh(Some(&id.to_hex()), "unknown_identity").await;
                return Err(AppError::unauthorized("Invalid refresh token"));
            }
            Err(e) => return Err(e),
        };
        self.audit
            .log(AuthEvent::new(AuthEventKind::Refreshed).with_user(id))
            .await;
        Ok(tokens)
    }

    async fn reject_refresh(&self, user_id: Option<&str>, reason: &str) {
        let mut event = AuthEvent::new(AuthEventKind::RefreshRejected).with_reason(reason);
        if let Some(id) = user_id {
            event = event.with_user(id);
        }
        self.audit.log(event).await;
    }

    /// Replace the password hash. Tokens are left as they are.
    pub async fn change_password(
        &self,
        user: &PublicUser,
        req: ChangePasswordRequest,
    ) -> Result<()> {
        if req.old_password.is_empty() || req.new_password.is_empty() {
            return Err(AppError::bad_request("oldPassword and newPassword are required"));
        }

        let stored = self
            .store
            .find_by_id(&user.id)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid access token"))?;

        if !verify_password(&req.old_password, &stored.password_hash).await? {
            return Err(AppError::bad_request("Invalid old password"));
        }

        let hash = hash_password(&req.new_password).await?;
        self.store.set_password_hash(&user.id, &hash).await?;

        self.audit
            .log(AuthEvent::new(AuthEventKind::PasswordChanged).with_user(user.id))
            .await;
        Ok(())
    }

    pub async fn update_account(
        &self,
        user: &PublicUser,
        req: UpdateAccountRequest,
    ) -> Result<PublicUser> {
        let full_name = non_blank(req.full_name.as_deref());
        let email = non_blank(req.email.as_deref());
        if full_name.is_none() && email.is_none() {
            return Err(AppError::bad_request("fullName or email is required"));
        }
        if email.is_some_and(|e| !e.contains('@')) {
            return Err(AppError::bad_request("email is invalid"));
        }

        let full_name = full_name.unwrap_or(&user.full_name);
        let email = email.map(normalize_handle).unwrap_or_else(|| user.email.clone());

        self.store
            .update_account(&user.id, full_name, &email)
            .await?
            .ok_or_else(|| AppError::not_found("User does not exist"))
    }

    /// Upload a new avatar or cover image and point the identity at it.
    /// The previous file is deleted best effort.
    pub async fn update_profile_image(
        &self,
        user: &PublicUser,
        image: ProfileImage,
        payload: Option<&MediaPayload>,
    ) -> Result<PublicUser> {
        let payload = payload.ok_or_else(|| match image {
            ProfileImage::Avatar => AppError::bad_request("Avatar file is missing"),
            ProfileImage::CoverImage => AppError::bad_request("Cover image file is missing"),
        })?;

        let uploaded = self.media.upload(payload).await?;

        let updated = match self
            .store
            .set_profile_image(&user.id, image, &uploaded.url)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.media.discard(&uploaded.public_id).await;
                return Err(AppError::not_found("User does not exist"));
            }
            Err(e) => {
                self.media.discard(&uploaded.public_id).await;
                return Err(e);
            }
        };

        let previous = match image {
            ProfileImage::Avatar => Some(user.avatar.as_str()),
            ProfileImage::CoverImage => user.cover_image.as_deref(),
        };
        if let Some(previous) = previous.filter(|p| *p != uploaded.url) {
            self.media.discard_url(previous).await;
        }

        debug!(user_id = %user.id, field = image.field(), "Profile image replaced");
        Ok(updated)
    }
}
