//! Error types for QA Base.
//!
//! A single error enum covers configuration, storage, index, and embedding
//! failures so every layer can propagate with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for QA Base.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record store has not been created yet
    #[error("Record store not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Writing the record store failed; the index was left untouched
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Vector index backend errors
    #[error("Index error: {0}")]
    Index(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Edits that reference unknown records or carry invalid content
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// True when the record store simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
