//! User document schema
//!
//! Stores credentials, profile fields, watch history and the single live
//! refresh token of each identity.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::serde_helpers::{
    serialize_object_ids_as_hex, serialize_opt_datetime_as_rfc3339,
};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Fields never loaded for request-scoped identities
pub fn secret_exclusion_projection() -> Document {
    doc! { "password": 0, "refreshToken": 0 }
}

/// Canonical form of a handle or contact address: trimmed and lower-cased
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Unique handle, stored lower-cased
    pub username: String,

    /// Unique contact address, stored lower-cased
    pub email: String,

    pub full_name: String,

    /// Public URL from the upload service
    pub avatar: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    /// Watched video ids, most recent first; duplicates allowed
    #[serde(default)]
    pub watch_history: Vec<ObjectId>,

    /// Argon2 PHC string
    #[serde(rename = "password", default)]
    pub password_hash: String,

    /// The one refresh token currently accepted for this identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(flatten)]
    pub metadata: Metadata,
}

impl UserDoc {
    /// Create a new user document; handle and address are normalized here
    pub fn new(
        username: &str,
        email: &str,
        full_name: &str,
        password_hash: String,
        avatar: String,
        cover_image: Option<String>,
    ) -> Self {
        Self {
            _id: None,
            username: normalize_handle(username),
            email: normalize_handle(email),
            full_name: full_name.trim().to_string(),
            avatar,
            cover_image,
            watch_history: Vec::new(),
            password_hash,
            refresh_token: None,
            metadata: Metadata::new(),
        }
    }

    /// Public projection of this record
    pub fn to_public(&self) -> PublicUser {
        PublicUser::from(self)
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "username": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("username_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "fullName": 1 },
                Some(
                    IndexOptions::builder()
                        .name("full_name_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// A user as it may leave the process.
///
/// Has no password or refresh token field, so neither can be serialized by
/// accident. Loaded from Mongo with `secret_exclusion_projection()`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(
        rename = "_id",
        serialize_with = "bson::serde_helpers::serialize_object_id_as_hex_string"
    )]
    pub id: ObjectId,

    pub username: String,

    pub email: String,

    pub full_name: String,

    pub avatar: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    #[serde(default, serialize_with = "serialize_object_ids_as_hex")]
    pub watch_history: Vec<ObjectId>,

    #[serde(default, serialize_with = "serialize_opt_datetime_as_rfc3339")]
    pub created_at: Option<DateTime>,

    #[serde(default, serialize_with = "serialize_opt_datetime_as_rfc3339")]
    pub updated_at: Option<DateTime>,
}

impl From<&UserDoc> for PublicUser {
    fn from(doc: &UserDoc) -> Self {
        Self {
            // Records read back from a store always carry an id
            id: doc._id.unwrap_or_else(ObjectId::new),
            username: doc.username.clone(),
            email: doc.email.clone(),
            full_name: doc.full_name.clone(),
            avatar: doc.avatar.clone(),
            cover_image: doc.cover_image.clone(),
            watch_history: doc.watch_history.clone(),
            created_at: doc.metadata.created_at,
            updated_at: doc.metadata.updated_at,
        }
    }
}
