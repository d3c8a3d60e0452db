// errors.rs
use thiserror::Error;

use crate::transform::DecodeError;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Fatal errors. Anything that reaches `main` ends the run with a
/// non-zero status; recoverable conditions (failed fetches, unresolved
/// addresses, unparsable text) never become an `EtlError`.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Failed to decode field '{field}': {source}")]
    Decode {
        field: String,
        #[source]
        source: DecodeError,
    },
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn selector(selector: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(field: impl Into<String>, source: DecodeError) -> Self {
        Self::Decode {
            field: field.into(),
            source,
        }
    }
}
