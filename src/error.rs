//! Error types for table editing operations.

use thiserror::Error;

/// Errors produced by [`crate::editor::TableEditor`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditorError {
    /// A table or column name failed the identifier-safety check.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The table has no single-column primary key.
    #[error("Table '{0}' has no primary key column")]
    NoPrimaryKey(String),

    /// Nothing left to write once the primary key was excluded.
    #[error("No columns to {0} after excluding primary key")]
    NoColumns(&'static str),

    /// Underlying file or driver failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EditorError {
    /// Stable code used in API error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            EditorError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            EditorError::NoPrimaryKey(_) => "NO_PRIMARY_KEY",
            EditorError::NoColumns(_) => "NO_COLUMNS",
            EditorError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<rusqlite::Error> for EditorError {
    fn from(err: rusqlite::Error) -> Self {
        EditorError::Storage(err.to_string())
    }
}

/// Result type for table editing operations.
pub type Result<T> = std::result::Result<T, EditorError>;
