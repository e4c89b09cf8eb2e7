//! Store error types.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry could not be decoded.
    #[error("Corrupted entry: {0}")]
    Corrupt(String),

    /// Entry could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Entry id does not map to a single safe file name.
    #[error("Invalid entry id: {0}")]
    InvalidId(String),
}

impl StoreError {
    /// Creates a corrupted entry error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    /// Creates an invalid id error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId(message.into())
    }

    /// Returns true if this error means the stored bytes are unusable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}
