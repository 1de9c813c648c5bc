//! Record codecs.
//!
//! A [`RecordCodec`] composes one [`FieldConverter`] per field and converts
//! whole records between wire payloads and application records. It also
//! computes minimal payload patches for partial updates.

use crate::convert::FieldConverter;
use crate::error::{Error, Result};
use crate::Payload;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Payload fields naming the owning collection, never mapped to the record.
pub const COLLECTION_IDENTITY_FIELDS: [&str; 2] = ["collectionId", "collectionName"];

/// Record fields assigned by the backend, never sent back to it.
pub const SERVER_ASSIGNED_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// An ordered set of field converters covering one entity type.
///
/// Lookup maps from both key spaces are precomputed at construction so
/// whole-record conversion stays linear in the number of fields.
#[derive(Debug)]
pub struct RecordCodec {
    converters: Vec<FieldConverter>,
    by_payload_key: HashMap<&'static str, usize>,
    by_record_key: HashMap<&'static str, usize>,
}

impl RecordCodec {
    /// Compose a codec from its field converters.
    ///
    /// # Panics
    ///
    /// Panics when two converters claim the same payload or record key. A
    /// codec definition is static configuration; a duplicate key can never
    /// be handled at runtime and fails loudly at startup instead.
    pub fn new(converters: Vec<FieldConverter>) -> Self {
        let mut by_payload_key = HashMap::with_capacity(converters.len());
        let mut by_record_key = HashMap::with_capacity(converters.len());
        for (index, converter) in converters.iter().enumerate() {
            let previous = by_payload_key.insert(converter.payload_key(), index);
            assert!(
                previous.is_none(),
                "duplicate converter for payload field `{}`",
                converter.payload_key()
            );
            let previous = by_record_key.insert(converter.record_key(), index);
            assert!(
                previous.is_none(),
                "duplicate converter for record field `{}`",
                converter.record_key()
            );
        }
        Self {
            converters,
            by_payload_key,
            by_record_key,
        }
    }

    /// Compose a codec from the base converters every collection carries
    /// (`id`, `created`, `updated`) plus the entity's own fields.
    pub fn with_base(fields: Vec<FieldConverter>) -> Self {
        let mut converters = vec![
            FieldConverter::id("id", "id"),
            FieldConverter::date_time("created", "createdAt"),
            FieldConverter::date_time("updated", "updatedAt"),
        ];
        converters.extend(fields);
        Self::new(converters)
    }

    /// The converters, in declaration order.
    pub fn converters(&self) -> &[FieldConverter] {
        &self.converters
    }

    /// Whether this codec maps wire field `deleted` to record field
    /// `deletedAt`, enabling soft deletion.
    pub fn is_soft_delete_supported(&self) -> bool {
        self.soft_delete_converter().is_some()
    }

    /// Convert a full wire payload into record shape.
    ///
    /// The collection identity fields are skipped; every other payload key
    /// must have a registered converter.
    pub fn payload_to_record(&self, payload: &Payload) -> Result<Payload> {
        let mut record = Payload::new();
        for (key, value) in payload {
            if COLLECTION_IDENTITY_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let converter = self
                .by_payload_key
                .get(key.as_str())
                .map(|&index| &self.converters[index])
                .ok_or_else(|| Error::UnmappedPayloadField(key.clone()))?;
            record.insert(
                converter.record_key().to_string(),
                converter.convert_to_record(value)?,
            );
        }
        Ok(record)
    }

    /// Convert a record-shaped map back into wire payload shape.
    ///
    /// The server-assigned fields are skipped; every other record key must
    /// have a registered converter.
    pub fn record_to_payload(&self, record: &Payload) -> Result<Payload> {
        let mut payload = Payload::new();
        for (key, value) in record {
            if SERVER_ASSIGNED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let converter = self
                .by_record_key
                .get(key.as_str())
                .map(|&index| &self.converters[index])
                .ok_or_else(|| Error::UnmappedRecordField(key.clone()))?;
            payload.insert(
                converter.payload_key().to_string(),
                converter.convert_to_payload(value)?,
            );
        }
        Ok(payload)
    }

    /// Compute a minimal payload patch.
    ///
    /// Without an old record this is a full [`Self::record_to_payload`].
    /// Otherwise both records are converted to payload shape and only the
    /// keys whose values differ structurally are kept.
    pub fn make_patch(&self, new_record: &Payload, old_record: Option<&Payload>) -> Result<Payload> {
        let new_payload = self.record_to_payload(new_record)?;
        let Some(old_record) = old_record else {
            return Ok(new_payload);
        };
        let old_payload = self.record_to_payload(old_record)?;

        let mut patch = Payload::new();
        for (key, value) in new_payload {
            if old_payload.get(&key) != Some(&value) {
                patch.insert(key, value);
            }
        }
        Ok(patch)
    }

    /// The one-field payload patch that soft-deletes a record at `now`.
    ///
    /// Fails with a configuration error when the codec has no soft-delete
    /// converter.
    pub fn soft_delete_patch(&self, now: DateTime<Utc>) -> Result<Payload> {
        let converter = self
            .soft_delete_converter()
            .ok_or_else(|| Error::UnmappedRecordField("deletedAt".to_string()))?;
        let record_value = Value::String(now.to_rfc3339());
        let mut patch = Payload::new();
        patch.insert(
            converter.payload_key().to_string(),
            converter.convert_to_payload(&record_value)?,
        );
        Ok(patch)
    }

    fn soft_delete_converter(&self) -> Option<&FieldConverter> {
        self.by_payload_key
            .get("deleted")
            .map(|&index| &self.converters[index])
            .filter(|converter| converter.record_key() == "deletedAt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn test_codec() -> RecordCodec {
        RecordCodec::with_base(vec![
            FieldConverter::passthrough("title", "title"),
            FieldConverter::nullable_string("email", "email"),
            FieldConverter::soft_delete(),
        ])
    }

    fn test_payload() -> Payload {
        let value = json!({
            "id": "abc123def456789",
            "collectionId": "col9876543210ab",
            "collectionName": "tasks",
            "created": "2024-01-01 00:00:00.000Z",
            "updated": "2024-01-01 00:00:00.000Z",
            "title": "write docs",
            "email": "",
            "deleted": "",
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn payload_to_record_converts_and_skips_identity_fields() {
        let codec = test_codec();
        let record = codec.payload_to_record(&test_payload()).unwrap();

        assert_eq!(record.get("id"), Some(&json!("abc123def456789")));
        assert_eq!(record.get("createdAt"), Some(&json!("2024-01-01T00:00:00Z")));
        assert_eq!(record.get("updatedAt"), record.get("createdAt"));
        assert_eq!(record.get("title"), Some(&json!("write docs")));
        assert_eq!(record.get("email"), Some(&Value::Null));
        assert_eq!(record.get("deletedAt"), Some(&Value::Null));
        assert!(record.get("collectionId").is_none());
        assert!(record.get("collectionName").is_none());
    }

    #[test]
    fn payload_to_record_fails_on_unmapped_field() {
        let codec = test_codec();
        let mut payload = test_payload();
        payload.insert("surprise".to_string(), json!(1));

        let result = codec.payload_to_record(&payload);
        assert!(matches!(result, Err(Error::UnmappedPayloadField(ref k)) if k == "surprise"));
    }

    #[test]
    fn record_to_payload_skips_server_assigned_fields() {
        let codec = test_codec();
        let record = codec.payload_to_record(&test_payload()).unwrap();
        let payload = codec.record_to_payload(&record).unwrap();

        assert!(payload.get("id").is_none());
        assert!(payload.get("created").is_none());
        assert!(payload.get("updated").is_none());
        assert_eq!(payload.get("title"), Some(&json!("write docs")));
        assert_eq!(payload.get("email"), Some(&json!("")));
        assert_eq!(payload.get("deleted"), Some(&json!("")));
    }

    #[test]
    fn record_to_payload_fails_on_unmapped_field() {
        let codec = test_codec();
        let mut record = Payload::new();
        record.insert("surprise".to_string(), json!(1));

        let result = codec.record_to_payload(&record);
        assert!(matches!(result, Err(Error::UnmappedRecordField(ref k)) if k == "surprise"));
    }

    #[test]
    fn patch_of_identical_records_is_empty() {
        let codec = test_codec();
        let record = codec.payload_to_record(&test_payload()).unwrap();

        let patch = codec.make_patch(&record, Some(&record)).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_without_old_record_is_full_payload() {
        let codec = test_codec();
        let record = codec.payload_to_record(&test_payload()).unwrap();

        let patch = codec.make_patch(&record, None).unwrap();
        assert_eq!(patch, codec.record_to_payload(&record).unwrap());
    }

    #[test]
    fn patch_keeps_only_changed_keys() {
        let codec = test_codec();
        let old = codec.payload_to_record(&test_payload()).unwrap();
        let mut new = old.clone();
        new.insert("title".to_string(), json!("rewrite docs"));

        let patch = codec.make_patch(&new, Some(&old)).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("title"), Some(&json!("rewrite docs")));
    }

    #[test]
    fn soft_delete_support_is_derived_from_converters() {
        assert!(test_codec().is_soft_delete_supported());

        let plain = RecordCodec::with_base(vec![FieldConverter::passthrough("title", "title")]);
        assert!(!plain.is_soft_delete_supported());
        assert!(matches!(
            plain.soft_delete_patch(Utc::now()),
            Err(Error::UnmappedRecordField(_))
        ));
    }

    #[test]
    fn soft_delete_patch_sets_wire_field() {
        let codec = test_codec();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let patch = codec.soft_delete_patch(now).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("deleted"), Some(&json!("2024-05-01 12:00:00.000Z")));
    }

    #[test]
    #[should_panic(expected = "duplicate converter for payload field `title`")]
    fn duplicate_payload_keys_panic() {
        RecordCodec::new(vec![
            FieldConverter::passthrough("title", "title"),
            FieldConverter::passthrough("title", "otherTitle"),
        ]);
    }

    #[test]
    #[should_panic(expected = "duplicate converter for record field `title`")]
    fn duplicate_record_keys_panic() {
        RecordCodec::new(vec![
            FieldConverter::passthrough("title", "title"),
            FieldConverter::passthrough("otherTitle", "title"),
        ]);
    }
}
