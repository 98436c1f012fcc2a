//! Error types for the blaster core library.

use thiserror::Error;

/// Top-level error type for all fallible engine operations.
///
/// Scheduling and review-quality math are deliberately infallible; errors
/// only arise at the storage and configuration boundaries.
#[derive(Error, Debug)]
pub enum BlasterError {
    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure (stored rows, config, keys).
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A profile referenced by the caller does not exist in the store.
    #[error("Profile not found: {0}")]
    ProfileNotFound(crate::types::ProfileId),

    /// A session was finalized twice; the batch write happens exactly once.
    #[error("Session already finalized")]
    SessionAlreadyFinalized,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, BlasterError>;
