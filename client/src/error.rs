//! Unified error handling for the client.

use thiserror::Error;

/// All possible errors from collection clients and stores.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] tether_codec::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map a backend HTTP status to the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 404 {
            Error::NotFound(message)
        } else {
            Error::Backend { status, message }
        }
    }

    /// Whether this error is the backend reporting a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
