//! Aggregation pipelines for the social graph
//!
//! Each view is one round trip: the pipeline starts at `users` and joins
//! `subscriptions` or `videos` server-side.

use bson::{doc, oid::ObjectId, Document};

use crate::db::schemas::{SUBSCRIPTION_COLLECTION, USER_COLLECTION, VIDEO_COLLECTION};

/// Profile of the user with `username`, with distinct subscriber and
/// subscribed-to counts and the viewer's subscription state.
///
/// `$setUnion` against an empty array de-duplicates the joined ids before
/// `$size`, so legacy duplicate edges never inflate the counts.
pub fn channel_profile_pipeline(username: &str, viewer: &ObjectId) -> Vec<Document> {
    let viewer = *viewer;
    vec![
        doc! { "$match": { "username": username } },
        doc! {
            "$lookup": {
                "from": SUBSCRIPTION_COLLECTION,
                "localField": "_id",
                "foreignField": "channel",
                "as": "subscribers",
            }
        },
        doc! {
            "$lookup": {
                "from": SUBSCRIPTION_COLLECTION,
                "localField": "_id",
                "foreignField": "subscriber",
                "as": "subscribedTo",
            }
        },
        doc! {
            "$addFields": {
                "subscribersCount": {
                    "$size": { "$setUnion": ["$subscribers.subscriber", []] }
                },
                "channelsSubscribedToCount": {
                    "$size": { "$setUnion": ["$subscribedTo.channel", []] }
                },
                "isSubscribed": {
                    "$in": [viewer, "$subscribers.subscriber"]
                },
            }
        },
        doc! {
            "$project": {
                "fullName": 1,
                "username": 1,
                "email": 1,
                "avatar": 1,
                "coverImage": 1,
                "subscribersCount": 1,
                "channelsSubscribedToCount": 1,
                "isSubscribed": 1,
            }
        },
        doc! { "$limit": 1 },
    ]
}

/// The viewer's stored history ids plus every referenced video, each with
/// its owner reduced to public fields.
///
/// `$lookup` by array does not keep array order or repeats, so the raw id
/// list is projected alongside and order is restored by the caller.
pub fn watch_history_pipeline(viewer: &ObjectId) -> Vec<Document> {
    let viewer = *viewer;
    vec![
        doc! { "$match": { "_id": viewer } },
        doc! {
            "$lookup": {
                "from": VIDEO_COLLECTION,
                "localField": "watchHistory",
                "foreignField": "_id",
                "as": "watchHistoryVideos",
                "pipeline": [
                    {
                        "$lookup": {
                            "from": USER_COLLECTION,
                            "localField": "owner",
                            "foreignField": "_id",
                            "as": "owner",
                            "pipeline": [
                                { "$project": { "username": 1, "fullName": 1, "avatar": 1 } }
                            ],
                        }
                    },
                    { "$addFields": { "owner": { "$first": "$owner" } } },
                ],
            }
        },
        doc! { "$project": { "watchHistory": 1, "watchHistoryVideos": 1 } },
    ]
}
