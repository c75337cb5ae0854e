//! Pure derivations over subscription edges and watch history
//!
//! The Mongo pipelines in `graph::pipeline` compute the same facts server-side;
//! the in-memory store calls these directly.

use std::collections::{HashMap, HashSet};

use bson::oid::ObjectId;

use crate::graph::WatchedVideo;

/// A directed "subscriber follows channel" relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionEdge {
    pub subscriber: ObjectId,
    pub channel: ObjectId,
}

/// Relationship counts for one channel as seen by one viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFacts {
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

/// Count distinct subscribers of `channel`, distinct channels it follows, and
/// whether `viewer` is among its subscribers.
///
/// Repeated identical edges count once.
pub fn derive_channel_facts<'a, I>(channel: &ObjectId, viewer: &ObjectId, edges: I) -> ChannelFacts
where
    I: IntoIterator<Item = &'a SubscriptionEdge>,
{
    let mut subscribers: HashSet<ObjectId> = HashSet::new();
    let mut following: HashSet<ObjectId> = HashSet::new();

    for edge in edges {
        if edge.channel == *channel {
            subscribers.insert(edge.subscriber);
        }
        if edge.subscriber == *channel {
            following.insert(edge.channel);
        }
    }

    ChannelFacts {
        subscribers_count: subscribers.len() as u64,
        channels_subscribed_to_count: following.len() as u64,
        is_subscribed: subscribers.contains(viewer),
    }
}

/// Lay resolved videos out in stored history order.
///
/// `history` is most-recent-first and may repeat ids; each occurrence yields
/// one entry. Ids with no resolved video are skipped.
pub fn order_by_history(history: &[ObjectId], videos: Vec<WatchedVideo>) -> Vec<WatchedVideo> {
    let by_id: HashMap<ObjectId, WatchedVideo> =
        videos.into_iter().map(|v| (v.id, v)).collect();

    history
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect()
}
