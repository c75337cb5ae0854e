//! Subscription edge schema
//!
//! One document per (subscriber, channel) pair. The compound unique index
//! keeps the pair from being stored twice.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for subscription edges
pub const SUBSCRIPTION_COLLECTION: &str = "subscriptions";

/// "subscriber follows channel"; both ends are user ids
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub subscriber: ObjectId,

    pub channel: ObjectId,

    #[serde(flatten)]
    pub metadata: Metadata,
}

impl SubscriptionDoc {
    pub fn new(subscriber: ObjectId, channel: ObjectId) -> Self {
        Self {
            _id: None,
            subscriber,
            channel,
            metadata: Metadata::new(),
        }
    }
}

impl IntoIndexes for SubscriptionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "subscriber": 1, "channel": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("subscriber_channel_unique".to_string())
                        .build(),
                ),
            ),
            // Subscriber counts look edges up by channel
            (
                doc! { "channel": 1 },
                Some(
                    IndexOptions::builder()
                        .name("channel_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SubscriptionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
