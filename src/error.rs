//! Error types for TrackStore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for TrackStore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Recoverable Outcomes
    // -------------------------------------------------------------------------
    #[error("Record {id} not found")]
    NotFound { id: i32 },

    #[error("Key {id} already present")]
    Conflict { id: i32 },

    #[error("Encoding error: {0}")]
    Encoding(String),

    // -------------------------------------------------------------------------
    // Construction Errors
    // -------------------------------------------------------------------------
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // -------------------------------------------------------------------------
    // Fatal Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted file: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// True for a missing search/update/delete target
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for a duplicate key on insert
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
