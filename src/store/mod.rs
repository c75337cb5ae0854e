//! Persistence seams
//!
//! Services hold an `Arc<dyn CredentialStore>` / `Arc<dyn GraphStore>` built
//! once at startup. `MongoStore` is the production backend; `MemoryStore`
//! backs dev mode without MongoDB and the tests.

mod memory;
mod mongo;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use bson::oid::ObjectId;

use crate::db::schemas::{PublicUser, UserDoc};
use crate::graph::{ChannelProfile, WatchedVideo};
use crate::types::Result;

/// Which profile image a media update targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileImage {
    Avatar,
    CoverImage,
}

impl ProfileImage {
    /// Stored field name
    pub fn field(&self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::CoverImage => "coverImage",
        }
    }
}

/// Identity records: credentials, profile fields and the live refresh token.
///
/// Every write is a single atomic update by id; concurrent writers to the
/// same record resolve last-writer-wins.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new identity. `Conflict` if the username or email is taken.
    async fn insert_identity(&self, user: UserDoc) -> Result<UserDoc>;

    /// Full record, including password hash and refresh token
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>>;

    /// Public projection only; secrets are never loaded
    async fn find_public_by_id(&self, id: &ObjectId) -> Result<Option<PublicUser>>;

    /// Match on either normalized field
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserDoc>>;

    /// Overwrite (`Some`) or clear (`None`) the refresh token.
    /// Returns false if no identity has this id.
    async fn set_refresh_token(&self, id: &ObjectId, token: Option<&str>) -> Result<bool>;

    async fn set_password_hash(&self, id: &ObjectId, password_hash: &str) -> Result<bool>;

    /// Update display name and email. `Conflict` if the email is taken.
    async fn update_account(
        &self,
        id: &ObjectId,
        full_name: &str,
        email: &str,
    ) -> Result<Option<PublicUser>>;

    async fn set_profile_image(
        &self,
        id: &ObjectId,
        image: ProfileImage,
        url: &str,
    ) -> Result<Option<PublicUser>>;

    /// Put `video` at the front of the history; repeats are kept
    async fn push_watch_history(&self, id: &ObjectId, video: &ObjectId) -> Result<bool>;

    /// Readiness probe
    async fn ping(&self) -> Result<()>;
}

/// Joins over identities, subscription edges and videos
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// `username` is already normalized
    async fn channel_profile(
        &self,
        viewer: &ObjectId,
        username: &str,
    ) -> Result<Option<ChannelProfile>>;

    async fn watch_history(&self, viewer: &ObjectId) -> Result<Vec<WatchedVideo>>;

    async fn identity_exists(&self, id: &ObjectId) -> Result<bool>;

    async fn video_exists(&self, id: &ObjectId) -> Result<bool>;

    /// Add the edge if absent, remove it if present.
    /// Returns whether the subscriber is subscribed afterwards.
    async fn toggle_subscription(&self, subscriber: &ObjectId, channel: &ObjectId)
        -> Result<bool>;
}
