//! Writes to the social graph: subscription toggles and watch-history appends

use std::sync::Arc;

use bson::oid::ObjectId;
use serde::Serialize;
use tracing::debug;

use crate::db::schemas::PublicUser;
use crate::store::{CredentialStore, GraphStore};
use crate::types::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub subscribed: bool,
}

fn parse_id(raw: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|_| AppError::bad_request(format!("Invalid {what} id")))
}

pub struct SocialService {
    credentials: Arc<dyn CredentialStore>,
    graph: Arc<dyn GraphStore>,
}

impl SocialService {
    pub fn new(credentials: Arc<dyn CredentialStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self { credentials, graph }
    }

    /// Subscribe to `channel_id`, or unsubscribe if already subscribed
    pub async fn toggle_subscription(
        &self,
        subscriber: &PublicUser,
        channel_id: &str,
    ) -> Result<SubscriptionState> {
        let channel = parse_id(channel_id, "channel")?;
        if channel == subscriber.id {
            return Err(AppError::bad_request("You cannot subscribe to your own channel"));
        }
        if !self.graph.identity_exists(&channel).await? {
            return Err(AppError::not_found("channel does not exist"));
        }

        let subscribed = self.graph.toggle_subscription(&subscriber.id, &channel).await?;
        debug!(subscriber = %subscriber.id, channel = %channel, subscribed, "Subscription toggled");
        Ok(SubscriptionState { subscribed })
    }

    /// Put `video_id` at the front of the viewer's history
    pub async fn record_watch(&self, viewer: &PublicUser, video_id: &str) -> Result<()> {
        let video = parse_id(video_id, "video")?;
        if !self.graph.video_exists(&video).await? {
            return Err(AppError::not_found("video does not exist"));
        }
        if !self.credentials.push_watch_history(&viewer.id, &video).await? {
            return Err(AppError::not_found("User does not exist"));
        }
        Ok(())
    }
}
