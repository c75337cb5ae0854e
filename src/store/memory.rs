//! In-process store
//!
//! DashMap-backed implementation of both store traits. Unique usernames and
//! emails are reserved through secondary index maps with the entry API, so
//! two concurrent registrations of the same handle cannot both succeed.
//! Per-record writes hold the entry's shard lock, giving the same
//! last-writer-wins behavior as an atomic update-by-id.

use bson::oid::ObjectId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{CredentialStore, GraphStore, ProfileImage};
use crate::db::schemas::{PublicUser, UserDoc, VideoDoc};
use crate::graph::{
    derive_channel_facts, order_by_history, ChannelProfile, SubscriptionEdge, VideoOwner,
    WatchedVideo,
};
use crate::types::{AppError, Result};

const DUPLICATE_IDENTITY: &str = "User with this email or username already exists";

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<ObjectId, UserDoc>,
    usernames: DashMap<String, ObjectId>,
    emails: DashMap<String, ObjectId>,
    subscriptions: DashMap<SubscriptionEdge, bson::DateTime>,
    videos: DashMap<ObjectId, VideoDoc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a video record; videos are otherwise written outside this service
    pub fn insert_video(&self, mut video: VideoDoc) -> ObjectId {
        let id = *video._id.get_or_insert_with(ObjectId::new);
        self.videos.insert(id, video);
        id
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Claim `key` for `id` in a unique index map
    fn reserve(index: &DashMap<String, ObjectId>, key: &str, id: ObjectId) -> Result<()> {
        match index.entry(key.to_string()) {
            Entry::Occupied(held) if *held.get() != id => {
                Err(AppError::Conflict(DUPLICATE_IDENTITY.into()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn public_owner(&self, id: &ObjectId) -> Option<VideoOwner> {
        self.users.get(id).map(|user| VideoOwner {
            id: *id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
        })
    }

    fn watched(&self, id: &ObjectId) -> Option<WatchedVideo> {
        let video = self.videos.get(id)?.clone();
        Some(WatchedVideo {
            id: *id,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            title: video.title,
            description: video.description,
            duration: video.duration,
            views: video.views,
            owner: self.public_owner(&video.owner),
        })
    }

    /// Apply `mutate` to one record under its entry lock
    fn modify<F>(&self, id: &ObjectId, mutate: F) -> Option<PublicUser>
    where
        F: FnOnce(&mut UserDoc),
    {
        let mut user = self.users.get_mut(id)?;
        mutate(&mut user);
        user.metadata.touch();
        Some(user.to_public())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_identity(&self, mut user: UserDoc) -> Result<UserDoc> {
        let id = *user._id.get_or_insert_with(ObjectId::new);

        Self::reserve(&self.usernames, &user.username, id)?;
        if let Err(e) = Self::reserve(&self.emails, &user.email, id) {
            self.usernames.remove_if(&user.username, |_, held| *held == id);
            return Err(e);
        }

        self.users.insert(id, user.clone());
        debug!(user_id = %id, "Identity inserted");
        Ok(user)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_public_by_id(&self, id: &ObjectId) -> Result<Option<PublicUser>> {
        Ok(self.users.get(id).map(|u| u.to_public()))
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserDoc>> {
        let id = username
            .and_then(|name| self.usernames.get(name).map(|id| *id))
            .or_else(|| email.and_then(|addr| self.emails.get(addr).map(|id| *id)));

        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.clone())))
    }

    async fn set_refresh_token(&self, id: &ObjectId, token: Option<&str>) -> Result<bool> {
        Ok(self
            .modify(id, |user| user.refresh_token = token.map(str::to_string))
            .is_some())
    }

    async fn set_password_hash(&self, id: &ObjectId, password_hash: &str) -> Result<bool> {
        Ok(self
            .modify(id, |user| user.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn update_account(
        &self,
        id: &ObjectId,
        full_name: &str,
        email: &str,
    ) -> Result<Option<PublicUser>> {
        let previous = match self.users.get(id) {
            Some(user) => user.email.clone(),
            None => return Ok(None),
        };

        if previous != email {
            Self::reserve(&self.emails, email, *id)?;
        }

        let updated = self.modify(id, |user| {
            user.full_name = full_name.to_string();
            user.email = email.to_string();
        });

        if previous != email {
            self.emails.remove_if(&previous, |_, held| held == id);
        }
        Ok(updated)
    }

    async fn set_profile_image(
        &self,
        id: &ObjectId,
        image: ProfileImage,
        url: &str,
    ) -> Result<Option<PublicUser>> {
        Ok(self.modify(id, |user| match image {
            ProfileImage::Avatar => user.avatar = url.to_string(),
            ProfileImage::CoverImage => user.cover_image = Some(url.to_string()),
        }))
    }

    async fn push_watch_history(&self, id: &ObjectId, video: &ObjectId) -> Result<bool> {
        Ok(self
            .modify(id, |user| user.watch_history.insert(0, *video))
            .is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryStore {
    async fn channel_profile(
        &self,
        viewer: &ObjectId,
        username: &str,
    ) -> Result<Option<ChannelProfile>> {
        let Some(channel_id) = self.usernames.get(username).map(|id| *id) else {
            return Ok(None);
        };
        let Some(channel) = self.users.get(&channel_id).map(|u| u.clone()) else {
            return Ok(None);
        };

        let edges: Vec<SubscriptionEdge> = self.subscriptions.iter().map(|e| *e.key()).collect();
        let facts = derive_channel_facts(&channel_id, viewer, &edges);

        Ok(Some(ChannelProfile {
            id: channel_id,
            full_name: channel.full_name,
            username: channel.username,
            email: channel.email,
            avatar: channel.avatar,
            cover_image: channel.cover_image,
            subscribers_count: facts.subscribers_count,
            channels_subscribed_to_count: facts.channels_subscribed_to_count,
            is_subscribed: facts.is_subscribed,
        }))
    }

    async fn watch_history(&self, viewer: &ObjectId) -> Result<Vec<WatchedVideo>> {
        let history = match self.users.get(viewer) {
            Some(user) => user.watch_history.clone(),
            None => return Ok(Vec::new()),
        };

        let mut seen = std::collections::HashSet::new();
        let resolved: Vec<WatchedVideo> = history
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.watched(id))
            .collect();

        Ok(order_by_history(&history, resolved))
    }

    async fn identity_exists(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.users.contains_key(id))
    }

    async fn video_exists(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.videos.contains_key(id))
    }

    async fn toggle_subscription(
        &self,
        subscriber: &ObjectId,
        channel: &ObjectId,
    ) -> Result<bool> {
        let edge = SubscriptionEdge {
            subscriber: *subscriber,
            channel: *channel,
        };
        match self.subscriptions.entry(edge) {
            Entry::Occupied(existing) => {
                existing.remove();
                Ok(false)
            }
            Entry::Vacant(slot) => {
                slot.insert(bson::DateTime::now());
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str) -> UserDoc {
        UserDoc::new(
            name,
            email,
            name,
            "$argon2id$fake".into(),
            "https://media.example/a.png".into(),
            None,
        )
    }

    #[tokio::test]
    async fn test_username_and_email_unique() {
        let store = MemoryStore::new();
        store.insert_identity(user("bob", "bob@example.com")).await.unwrap();

        let err = store
            .insert_identity(user("BOB", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = store
            .insert_identity(user("robert", "Bob@Example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // A failed email reservation must not leave the username claimed
        store
            .insert_identity(user("robert", "robert@example.com"))
            .await
            .unwrap();
        assert_eq!(store.user_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_token_overwrite_and_clear() {
        let store = MemoryStore::new();
        let id = store
            .insert_identity(user("amy", "amy@example.com"))
            .await
            .unwrap()
            ._id
            .unwrap();

        assert!(store.set_refresh_token(&id, Some("one")).await.unwrap());
        assert!(store.set_refresh_token(&id, Some("two")).await.unwrap());
        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("two"));

        assert!(store.set_refresh_token(&id, None).await.unwrap());
        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(stored.refresh_token.is_none());

        assert!(!store.set_refresh_token(&ObjectId::new(), Some("x")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_account_moves_email_reservation() {
        let store = MemoryStore::new();
        let id = store
            .insert_identity(user("amy", "amy@example.com"))
            .await
            .unwrap()
            ._id
            .unwrap();
        store.insert_identity(user("ben", "ben@example.com")).await.unwrap();

        let err = store
            .update_account(&id, "Amy", "ben@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let updated = store
            .update_account(&id, "Amy A", "amy.a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, "amy.a@example.com");

        // Old address is free again
        store.insert_identity(user("cat", "amy@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_subscription_flips() {
        let store = MemoryStore::new();
        let (a, b) = (ObjectId::new(), ObjectId::new());
        assert!(store.toggle_subscription(&a, &b).await.unwrap());
        assert!(!store.toggle_subscription(&a, &b).await.unwrap());
        assert!(store.toggle_subscription(&a, &b).await.unwrap());
        assert_eq!(store.subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn test_history_front_insert_keeps_repeats() {
        let store = MemoryStore::new();
        let id = store
            .insert_identity(user("amy", "amy@example.com"))
            .await
            .unwrap()
            ._id
            .unwrap();
        let (v1, v2) = (ObjectId::new(), ObjectId::new());
        for v in [v1, v2, v1] {
            store.push_watch_history(&id, &v).await.unwrap();
        }
        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.watch_history, vec![v1, v2, v1]);
    }
}
