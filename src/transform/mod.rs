pub mod decoders;
pub mod registry;
pub mod transformer;

use thiserror::Error;

pub use transformer::{Transform, Transformer};

/// A raw value had the expected shape but could not be read.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected at least {expected} items, found {found}")]
    TooFewItems { expected: usize, found: usize },

    #[error("'{0}' is not a valid number")]
    Number(String),

    #[error("decoder produced {got} values but {expected} features are declared")]
    Width { expected: usize, got: usize },

    #[error("column '{0}' is missing from the raw table")]
    MissingColumn(String),
}

impl DecodeError {
    pub fn number(text: impl Into<String>) -> Self {
        Self::Number(text.into())
    }
}
