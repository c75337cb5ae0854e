//! MongoDB store
//!
//! Single-document writes use atomic update-by-id operators (`$set`, `$unset`,
//! `$push`). Social graph reads are one aggregation round trip each.

use bson::{doc, oid::ObjectId, Document};
use serde::Deserialize;
use tracing::debug;

use super::{CredentialStore, GraphStore, ProfileImage};
use crate::db::schemas::{
    secret_exclusion_projection, PublicUser, SubscriptionDoc, UserDoc, VideoDoc,
    SUBSCRIPTION_COLLECTION, USER_COLLECTION, VIDEO_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::graph::pipeline::{channel_profile_pipeline, watch_history_pipeline};
use crate::graph::{order_by_history, ChannelProfile, WatchedVideo};
use crate::types::{AppError, Result};

/// Output row of the watch history pipeline
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    #[serde(default)]
    watch_history: Vec<ObjectId>,
    #[serde(default)]
    watch_history_videos: Vec<WatchedVideo>,
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    users: MongoCollection<UserDoc>,
    subscriptions: MongoCollection<SubscriptionDoc>,
    videos: MongoCollection<VideoDoc>,
}

impl MongoStore {
    /// Open the collections, applying their indexes
    pub async fn new(client: MongoClient) -> Result<Self> {
        let users = client.collection::<UserDoc>(USER_COLLECTION).await?;
        let subscriptions = client
            .collection::<SubscriptionDoc>(SUBSCRIPTION_COLLECTION)
            .await?;
        let videos = client.collection::<VideoDoc>(VIDEO_COLLECTION).await?;

        Ok(Self {
            client,
            users,
            subscriptions,
            videos,
        })
    }

    async fn update_public(&self, id: &ObjectId, update: Document) -> Result<Option<PublicUser>> {
        self.users
            .find_one_and_update_projected::<PublicUser>(
                doc! { "_id": *id },
                update,
                secret_exclusion_projection(),
            )
            .await
    }
}

/// `$or` over whichever of username / email is present
fn identity_filter(username: Option<&str>, email: Option<&str>) -> Option<Document> {
    let mut clauses = Vec::new();
    if let Some(name) = username {
        clauses.push(doc! { "username": name });
    }
    if let Some(addr) = email {
        clauses.push(doc! { "email": addr });
    }
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(doc! { "$or": clauses }),
    }
}

#[async_trait::async_trait]
impl CredentialStore for MongoStore {
    async fn insert_identity(&self, mut user: UserDoc) -> Result<UserDoc> {
        let id = self.users.insert_one(user.clone()).await?;
        user._id = Some(id);
        debug!(user_id = %id, "Identity inserted");
        Ok(user)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "_id": *id }).await
    }

    async fn find_public_by_id(&self, id: &ObjectId) -> Result<Option<PublicUser>> {
        self.users
            .find_one_projected::<PublicUser>(doc! { "_id": *id }, secret_exclusion_projection())
            .await
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserDoc>> {
        match identity_filter(username, email) {
            Some(filter) => self.users.find_one(filter).await,
            None => Ok(None),
        }
    }

    async fn set_refresh_token(&self, id: &ObjectId, token: Option<&str>) -> Result<bool> {
        let update = match token {
            Some(token) => doc! { "$set": { "refreshToken": token } },
            None => doc! { "$unset": { "refreshToken": 1 } },
        };
        let result = self.users.update_one(doc! { "_id": *id }, update).await?;
        Ok(result.matched_count > 0)
    }

    async fn set_password_hash(&self, id: &ObjectId, password_hash: &str) -> Result<bool> {
        let result = self
            .users
            .update_one(
                doc! { "_id": *id },
                doc! { "$set": { "password": password_hash } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn update_account(
        &self,
        id: &ObjectId,
        full_name: &str,
        email: &str,
    ) -> Result<Option<PublicUser>> {
        self.update_public(id, doc! { "$set": { "fullName": full_name, "email": email } })
            .await
    }

    async fn set_profile_image(
        &self,
        id: &ObjectId,
        image: ProfileImage,
        url: &str,
    ) -> Result<Option<PublicUser>> {
        let mut set = Document::new();
        set.insert(image.field(), url);
        self.update_public(id, doc! { "$set": set }).await
    }

    async fn push_watch_history(&self, id: &ObjectId, video: &ObjectId) -> Result<bool> {
        let result = self
            .users
            .update_one(
                doc! { "_id": *id },
                doc! { "$push": { "watchHistory": { "$each": [*video], "$position": 0 } } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }
}

#[async_trait::async_trait]
impl GraphStore for MongoStore {
    async fn channel_profile(
        &self,
        viewer: &ObjectId,
        username: &str,
    ) -> Result<Option<ChannelProfile>> {
        let rows = self
            .users
            .aggregate(channel_profile_pipeline(username, viewer))
            .await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(bson::from_document(row)?)),
            None => Ok(None),
        }
    }

    async fn watch_history(&self, viewer: &ObjectId) -> Result<Vec<WatchedVideo>> {
        let rows = self.users.aggregate(watch_history_pipeline(viewer)).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(Vec::new());
        };

        let row: HistoryRow = bson::from_document(row)?;
        Ok(order_by_history(&row.watch_history, row.watch_history_videos))
    }

    async fn identity_exists(&self, id: &ObjectId) -> Result<bool> {
        self.users.exists(doc! { "_id": *id }).await
    }

    async fn video_exists(&self, id: &ObjectId) -> Result<bool> {
        self.videos.exists(doc! { "_id": *id }).await
    }

    async fn toggle_subscription(
        &self,
        subscriber: &ObjectId,
        channel: &ObjectId,
    ) -> Result<bool> {
        let edge = doc! { "subscriber": *subscriber, "channel": *channel };
        let removed = self.subscriptions.delete_one(edge).await?;
        if removed.deleted_count > 0 {
            return Ok(false);
        }

        match self
            .subscriptions
            .insert_one(SubscriptionDoc::new(*subscriber, *channel))
            .await
        {
            Ok(_) => Ok(true),
            // A concurrent toggle inserted the same edge first
            Err(AppError::Conflict(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }
}
