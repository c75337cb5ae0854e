//! Database schemas for vidtube
//!
//! Defines MongoDB document structures for users, subscription edges and videos.

mod metadata;
mod serde_helpers;
mod subscription;
mod user;
mod video;

pub use metadata::Metadata;
pub use serde_helpers::{serialize_object_ids_as_hex, serialize_opt_datetime_as_rfc3339};
pub use subscription::{SubscriptionDoc, SUBSCRIPTION_COLLECTION};
pub use user::{
    normalize_handle, secret_exclusion_projection, PublicUser, UserDoc, USER_COLLECTION,
};
pub use video::{VideoDoc, VIDEO_COLLECTION};
