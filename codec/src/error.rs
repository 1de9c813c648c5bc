//! Error types for the Tether codec.

use thiserror::Error;

/// All possible errors from record and field conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors: a wire value failed a converter's grammar check.
    #[error("invalid record id: {0:?}")]
    InvalidRecordId(String),

    #[error("invalid date time: {0:?}")]
    InvalidDateTime(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid interval: {0:?}")]
    InvalidInterval(String),

    #[error("invalid selection: {0:?}")]
    InvalidSelect(String),

    #[error("invalid multi selection: {0}")]
    InvalidMultiSelect(String),

    // Configuration errors: the codec does not cover a field it was handed.
    // These indicate a codec definition out of sync with the schema and are
    // never recovered from by any layer above.
    #[error("no converter registered for payload field: {0}")]
    UnmappedPayloadField(String),

    #[error("no converter registered for record field: {0}")]
    UnmappedRecordField(String),

    // A converted map did not fit the typed record shape.
    #[error("record shape mismatch: {0}")]
    Shape(String),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
