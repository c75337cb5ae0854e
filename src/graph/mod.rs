//! Social graph views
//!
//! Derived relationship facts that need a join across users, subscription
//! edges and videos:
//! - channel profile with subscriber / subscribed-to counts and `isSubscribed`
//! - watch history hydrated into video summaries with public owner fields

pub mod derive;
pub mod pipeline;

use std::sync::Arc;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::schemas::normalize_handle;
use crate::store::GraphStore;
use crate::types::{AppError, Result};

pub use derive::{derive_channel_facts, order_by_history, ChannelFacts, SubscriptionEdge};

/// A user's public channel page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    #[serde(
        rename = "_id",
        serialize_with = "bson::serde_helpers::serialize_object_id_as_hex_string"
    )]
    pub id: ObjectId,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

/// Public fields of a video's owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoOwner {
    #[serde(
        rename = "_id",
        serialize_with = "bson::serde_helpers::serialize_object_id_as_hex_string"
    )]
    pub id: ObjectId,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

/// One watch-history entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchedVideo {
    #[serde(
        rename = "_id",
        serialize_with = "bson::serde_helpers::serialize_object_id_as_hex_string"
    )]
    pub id: ObjectId,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub views: i64,
    /// Absent when the owner account no longer exists
    #[serde(default)]
    pub owner: Option<VideoOwner>,
}

/// Read side of the social graph
pub struct SocialGraphResolver {
    store: Arc<dyn GraphStore>,
}

impl SocialGraphResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Channel page for `username` as seen by `viewer`
    pub async fn channel_profile(
        &self,
        viewer: &ObjectId,
        username: &str,
    ) -> Result<ChannelProfile> {
        let username = normalize_handle(username);
        if username.is_empty() {
            return Err(AppError::bad_request("username is missing"));
        }

        let profile = self
            .store
            .channel_profile(viewer, &username)
            .await?
            .ok_or_else(|| AppError::not_found("channel does not exist"))?;

        debug!(
            channel = %profile.id,
            subscribers = profile.subscribers_count,
            "Resolved channel profile"
        );
        Ok(profile)
    }

    /// Viewer's history, most recent first, repeats kept
    pub async fn watch_history(&self, viewer: &ObjectId) -> Result<Vec<WatchedVideo>> {
        self.store.watch_history(viewer).await
    }
}
