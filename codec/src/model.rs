//! Typed record models.
//!
//! A [`Model`] ties a typed record struct to the [`RecordCodec`] covering
//! its fields, so collection clients can hand out real types instead of raw
//! JSON maps. The struct's serde representation must use the record-side
//! field names (camelCase, `createdAt`/`updatedAt`, nullable fields as
//! `Option`).

use crate::codec::RecordCodec;
use crate::error::{Error, Result};
use crate::id::RecordId;
use crate::Payload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed application record backed by one backend collection.
pub trait Model: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The editable fields of the model — everything the backend does not
    /// assign itself.
    type Fields: Serialize + DeserializeOwned + Send + Sync;

    /// The codec covering every field of this model.
    fn codec() -> &'static RecordCodec;

    /// The record's identifier.
    fn id(&self) -> &RecordId;
}

/// Marker for models living in an auth-capable collection.
pub trait AuthModel: Model {}

/// Decode a wire payload into a typed record.
pub fn decode_record<M: Model>(payload: &Payload) -> Result<M> {
    let record = M::codec().payload_to_record(payload)?;
    serde_json::from_value(Value::Object(record)).map_err(|e| Error::Shape(e.to_string()))
}

/// Encode a model's editable fields into wire payload shape.
pub fn encode_fields<M: Model>(fields: &M::Fields) -> Result<Payload> {
    let record = to_object(fields)?;
    M::codec().record_to_payload(&record)
}

/// Compute a minimal wire patch between two editable-field values.
///
/// Without `old` this is a full [`encode_fields`].
pub fn patch_fields<M: Model>(new: &M::Fields, old: Option<&M::Fields>) -> Result<Payload> {
    let new_record = to_object(new)?;
    let old_record = old.map(to_object).transpose()?;
    M::codec().make_patch(&new_record, old_record.as_ref())
}

fn to_object<T: Serialize>(value: &T) -> Result<Payload> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::Shape(format!("expected an object, got {other}"))),
        Err(e) => Err(Error::Shape(e.to_string())),
    }
}
