//! Field converters.
//!
//! A [`FieldConverter`] is a pure, bidirectional mapping for exactly one
//! field between the backend's wire representation and the application
//! record representation. Converters are composed into a
//! [`RecordCodec`](crate::codec::RecordCodec), one per field.
//!
//! Every variant upholds the round-trip invariant: converting a legally
//! occurring wire value to its record form and back reproduces a wire-valid
//! value. Out-of-grammar wire values are rejected, never passed through.

use crate::error::{Error, Result};
use crate::id::RecordId;
use crate::select::{may_be_select, must_be_select, Select};
use crate::value::{format_date_time, non_blank, parse_date_time};
use chrono::SecondsFormat;
use serde_json::Value;
use std::fmt;

type ConvertFn = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A bidirectional mapping for one field.
pub struct FieldConverter {
    payload_key: &'static str,
    record_key: &'static str,
    payload_to_record: ConvertFn,
    record_to_payload: ConvertFn,
}

impl fmt::Debug for FieldConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConverter")
            .field("payload_key", &self.payload_key)
            .field("record_key", &self.record_key)
            .finish()
    }
}

impl FieldConverter {
    /// The field's name in the wire payload.
    pub fn payload_key(&self) -> &'static str {
        self.payload_key
    }

    /// The field's name in the application record.
    pub fn record_key(&self) -> &'static str {
        self.record_key
    }

    /// Convert a wire value into its record form.
    pub fn convert_to_record(&self, value: &Value) -> Result<Value> {
        (self.payload_to_record)(value)
    }

    /// Convert a record value back into its wire form.
    pub fn convert_to_payload(&self, value: &Value) -> Result<Value> {
        (self.record_to_payload)(value)
    }

    /// Identity mapping: the value passes through unchanged in both
    /// directions.
    pub fn passthrough(payload_key: &'static str, record_key: &'static str) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| Ok(value.clone())),
            record_to_payload: Box::new(|value| Ok(value.clone())),
        }
    }

    /// Id mapping: the wire value must match the backend id grammar.
    pub fn id(payload_key: &'static str, record_key: &'static str) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| {
                let raw = expect_str(value, Error::InvalidRecordId)?;
                let id = RecordId::new(raw)?;
                Ok(Value::String(id.into_string()))
            }),
            record_to_payload: Box::new(|value| Ok(value.clone())),
        }
    }

    /// Date-time mapping: backend wire format to a real date-time value.
    pub fn date_time(payload_key: &'static str, record_key: &'static str) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| {
                let raw = expect_str(value, Error::InvalidDateTime)?;
                let parsed = parse_date_time(raw)?;
                Ok(Value::String(
                    parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                ))
            }),
            record_to_payload: Box::new(|value| {
                let raw = expect_str(value, Error::InvalidDateTime)?;
                let parsed = parse_date_time(raw)?;
                Ok(Value::String(format_date_time(&parsed)))
            }),
        }
    }

    /// Nullable date-time mapping: a blank wire value becomes null.
    pub fn nullable_date_time(payload_key: &'static str, record_key: &'static str) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| match value.as_str() {
                Some(raw) if non_blank(raw) => {
                    let parsed = parse_date_time(raw)?;
                    Ok(Value::String(
                        parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    ))
                }
                _ => Ok(Value::Null),
            }),
            record_to_payload: Box::new(|value| match value.as_str() {
                Some(raw) if non_blank(raw) => {
                    let parsed = parse_date_time(raw)?;
                    Ok(Value::String(format_date_time(&parsed)))
                }
                _ => Ok(Value::String(String::new())),
            }),
        }
    }

    /// Nullable string mapping with the default non-blank predicate.
    pub fn nullable_string(payload_key: &'static str, record_key: &'static str) -> Self {
        Self::nullable_string_with(payload_key, record_key, non_blank)
    }

    /// Nullable string mapping with a caller-supplied presence predicate.
    pub fn nullable_string_with(
        payload_key: &'static str,
        record_key: &'static str,
        is_present: fn(&str) -> bool,
    ) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(move |value| match value.as_str() {
                Some(raw) if is_present(raw) => Ok(Value::String(raw.to_string())),
                _ => Ok(Value::Null),
            }),
            record_to_payload: Box::new(|value| match value {
                Value::Null => Ok(Value::String(String::new())),
                other => Ok(other.clone()),
            }),
        }
    }

    /// Single-selection mapping: the wire value must be a member of `E`.
    pub fn single_select<E: Select + 'static>(
        payload_key: &'static str,
        record_key: &'static str,
    ) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| {
                let raw = expect_str(value, Error::InvalidSelect)?;
                let member: E = must_be_select(raw)?;
                Ok(Value::String(member.as_wire().to_string()))
            }),
            record_to_payload: Box::new(|value| match value {
                Value::Null => Ok(Value::String(String::new())),
                other => Ok(other.clone()),
            }),
        }
    }

    /// Nullable single-selection mapping: blank or out-of-set wire values
    /// become null instead of failing.
    pub fn nullable_single_select<E: Select + 'static>(
        payload_key: &'static str,
        record_key: &'static str,
    ) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| {
                let member = value.as_str().and_then(may_be_select::<E>);
                Ok(match member {
                    Some(member) => Value::String(member.as_wire().to_string()),
                    None => Value::Null,
                })
            }),
            record_to_payload: Box::new(|value| match value {
                Value::Null => Ok(Value::String(String::new())),
                other => Ok(other.clone()),
            }),
        }
    }

    /// Multi-selection mapping: every element must be a member of `E`; a
    /// single bad element rejects the whole array.
    pub fn multi_select<E: Select + 'static>(
        payload_key: &'static str,
        record_key: &'static str,
    ) -> Self {
        Self {
            payload_key,
            record_key,
            payload_to_record: Box::new(|value| {
                let items = value
                    .as_array()
                    .ok_or_else(|| Error::InvalidMultiSelect(value.to_string()))?;
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    let raw = item
                        .as_str()
                        .ok_or_else(|| Error::InvalidMultiSelect(value.to_string()))?;
                    let member: E = must_be_select(raw)
                        .map_err(|_| Error::InvalidMultiSelect(value.to_string()))?;
                    members.push(Value::String(member.as_wire().to_string()));
                }
                Ok(Value::Array(members))
            }),
            record_to_payload: Box::new(|value| match value {
                Value::Null => Ok(Value::Array(Vec::new())),
                other => Ok(other.clone()),
            }),
        }
    }

    /// The soft-delete mapping: wire field `deleted` to record field
    /// `deletedAt`. A codec containing this converter supports soft
    /// deletion.
    pub fn soft_delete() -> Self {
        Self::nullable_date_time("deleted", "deletedAt")
    }
}

fn expect_str(value: &Value, reject: fn(String) -> Error) -> Result<&str> {
    value.as_str().ok_or_else(|| reject(value.to_string()))
}
