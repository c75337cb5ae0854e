//! Video document schema
//!
//! Videos are written by the upload flow; this crate only reads them to
//! hydrate watch history.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for videos
pub const VIDEO_COLLECTION: &str = "videos";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Public URL of the media file
    pub video_file: String,

    /// Public URL of the thumbnail image
    pub thumbnail: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Length in seconds
    #[serde(default)]
    pub duration: f64,

    #[serde(default)]
    pub views: i64,

    #[serde(default = "default_true")]
    pub is_published: bool,

    /// Uploading user
    pub owner: ObjectId,

    #[serde(flatten)]
    pub metadata: Metadata,
}

fn default_true() -> bool {
    true
}

impl VideoDoc {
    pub fn new(owner: ObjectId, title: &str, video_file: String, thumbnail: String) -> Self {
        Self {
            _id: None,
            video_file,
            thumbnail,
            title: title.to_string(),
            description: String::new(),
            duration: 0.0,
            views: 0,
            is_published: true,
            owner,
            metadata: Metadata::new(),
        }
    }
}

impl IntoIndexes for VideoDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "owner": 1 },
            Some(
                IndexOptions::builder()
                    .name("owner_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for VideoDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
