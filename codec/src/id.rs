//! Branded record identifiers.
//!
//! The backend issues ids of exactly 15 alphanumeric characters. A legacy
//! all-numeric form from older installations is also accepted. Holding a
//! [`RecordId`] is proof the contained string matched one of the two shapes.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated backend record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Validate a raw string and brand it as a record id.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if is_valid_id(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidRecordId(value))
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Check a raw string against the backend id grammar.
pub fn is_valid_id(value: &str) -> bool {
    let standard = value.len() == 15 && value.chars().all(|c| c.is_ascii_alphanumeric());
    let legacy = !value.is_empty() && value.chars().all(|c| c.is_ascii_digit());
    standard || legacy
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RecordId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl PartialEq<str> for RecordId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RecordId::new(raw).map_err(serde::de::Error::custom)
    }
}
