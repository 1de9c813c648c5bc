//! # Tether Codec
//!
//! The pure conversion layer between a hosted record backend's wire payloads
//! and typed application records.
//!
//! The backend transmits records as flat JSON objects: string-typed dates,
//! empty strings for absent values, unvalidated selection fields. The
//! application wants branded ids, real date-time values, `Option` for
//! nullable fields, and closed enums. This crate bridges the two, one field
//! at a time.
//!
//! ## Design Principles
//!
//! - **No IO**: the codec has no knowledge of HTTP, sessions, or caches
//! - **Deterministic**: the same payload always converts to the same record
//! - **Round-trip safe**: every legally occurring wire value survives a
//!   payload → record → payload trip
//!
//! ## Core Concepts
//!
//! ### Field Converters
//!
//! A [`FieldConverter`] maps exactly one field in both directions. Variants
//! cover identity values, ids, date-times, nullable strings, and
//! single/multi-selection enums.
//!
//! ### Record Codecs
//!
//! A [`RecordCodec`] composes converters for a whole entity type, converts
//! full records, and computes minimal patches for partial updates. A codec
//! that maps wire field `deleted` to record field `deletedAt` supports soft
//! deletion.
//!
//! ### Models
//!
//! The [`Model`] trait ties a typed record struct to its codec, so the
//! layers above can hand out real types instead of JSON maps.
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_codec::{FieldConverter, RecordCodec};
//! use serde_json::{json, Value};
//!
//! let codec = RecordCodec::with_base(vec![
//!     FieldConverter::passthrough("title", "title"),
//!     FieldConverter::nullable_string("email", "email"),
//! ]);
//!
//! let payload = match json!({
//!     "id": "abc123def456789",
//!     "created": "2024-01-01 00:00:00.000Z",
//!     "updated": "2024-01-01 00:00:00.000Z",
//!     "title": "hello",
//!     "email": "",
//! }) {
//!     Value::Object(map) => map,
//!     _ => unreachable!(),
//! };
//!
//! let record = codec.payload_to_record(&payload).unwrap();
//! assert_eq!(record["createdAt"], json!("2024-01-01T00:00:00Z"));
//! assert_eq!(record["email"], Value::Null);
//! ```

pub mod codec;
pub mod convert;
pub mod error;
pub mod id;
pub mod model;
pub mod select;
pub mod value;

// Re-export main types at crate root
pub use codec::{RecordCodec, COLLECTION_IDENTITY_FIELDS, SERVER_ASSIGNED_FIELDS};
pub use convert::FieldConverter;
pub use error::{Error, Result};
pub use id::{is_valid_id, RecordId};
pub use model::{decode_record, encode_fields, patch_fields, AuthModel, Model};
pub use select::{may_be_select, must_be_select, Select};
pub use value::{
    format_date_time, format_duration, non_blank, parse_date_time, parse_duration,
    parse_interval, parse_optional_date_time, parse_optional_duration, Interval,
};

/// A flat JSON object, used for both wire payloads and record-shaped maps.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Name of a backend collection.
pub type CollectionName = String;
