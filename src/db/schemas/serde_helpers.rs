//! Serializers for API output of BSON-native fields

use bson::{oid::ObjectId, DateTime};
use serde::{ser::SerializeSeq, Serializer};

/// Serialize a list of ObjectIds as hex strings
pub fn serialize_object_ids_as_hex<S: Serializer>(
    ids: &[ObjectId],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(ids.len()))?;
    for id in ids {
        seq.serialize_element(&id.to_hex())?;
    }
    seq.end()
}

/// Serialize an optional BSON datetime as an RFC 3339 string
pub fn serialize_opt_datetime_as_rfc3339<S: Serializer>(
    value: &Option<DateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => serializer.serialize_str(&dt.to_chrono().to_rfc3339()),
        None => serializer.serialize_none(),
    }
}
