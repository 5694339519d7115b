use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid store name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),
}
