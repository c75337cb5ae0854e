//! Credential store that can be told to fail, for failure-path tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bson::oid::ObjectId;

use super::{CredentialStore, MemoryStore, ProfileImage};
use crate::db::schemas::{PublicUser, UserDoc};
use crate::types::{AppError, Result};

/// Wraps a `MemoryStore`; switched-on faults replace the inner call
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    /// `set_refresh_token` fails with a database error
    pub fail_token_writes: AtomicBool,
    /// reads time out with `Unavailable`
    pub time_out_reads: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_token_writes: AtomicBool::new(false),
            time_out_reads: AtomicBool::new(false),
        }
    }

    pub fn set_fail_token_writes(&self, on: bool) {
        self.fail_token_writes.store(on, Ordering::SeqCst);
    }

    pub fn set_time_out_reads(&self, on: bool) {
        self.time_out_reads.store(on, Ordering::SeqCst);
    }

    fn read_gate(&self) -> Result<()> {
        if self.time_out_reads.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("store call exceeded 5000ms".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for FaultyStore {
    async fn insert_identity(&self, user: UserDoc) -> Result<UserDoc> {
        self.inner.insert_identity(user).await
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        self.read_gate()?;
        self.inner.find_by_id(id).await
    }

    async fn find_public_by_id(&self, id: &ObjectId) -> Result<Option<PublicUser>> {
        self.read_gate()?;
        self.inner.find_public_by_id(id).await
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserDoc>> {
        self.read_gate()?;
        self.inner.find_by_username_or_email(username, email).await
    }

    async fn set_refresh_token(&self, id: &ObjectId, token: Option<&str>) -> Result<bool> {
        if self.fail_token_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("write concern error".into()));
        }
        self.inner.set_refresh_token(id, token).await
    }

    async fn set_password_hash(&self, id: &ObjectId, password_hash: &str) -> Result<bool> {
        self.inner.set_password_hash(id, password_hash).await
    }

    async fn update_account(
        &self,
        id: &ObjectId,
        full_name: &str,
        email: &str,
    ) -> Result<Option<PublicUser>> {
        self.inner.update_account(id, full_name, email).await
    }

    async fn set_profile_image(
        &self,
        id: &ObjectId,
        image: ProfileImage,
        url: &str,
    ) -> Result<Option<PublicUser>> {
        self.inner.set_profile_image(id, image, url).await
    }

    async fn push_watch_history(&self, id: &ObjectId, video: &ObjectId) -> Result<bool> {
        self.inner.push_watch_history(id, video).await
    }

    async fn ping(&self) -> Result<()> {
        self.read_gate()?;
        self.inner.ping().await
    }
}
