//! Storage error types for labbook-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the storage
//! layer: database and migration failures, missing parent records,
//! ambiguous natural keys and malformed metadata files.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite driver reported an error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a metadata file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An irradiation with the given name was not found.
    #[error("irradiation not found: {0}")]
    IrradiationNotFound(String),

    /// A level was not found in the given irradiation.
    #[error("level not found: irradiation={irradiation}, level={level}")]
    LevelNotFound { irradiation: String, level: String },

    /// A project with the given name was not found.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// A position row id did not resolve.
    #[error("irradiation position not found: {0}")]
    PositionNotFound(i64),

    /// No position carries the given identifier.
    #[error("identifier not found: {0}")]
    IdentifierNotFound(String),

    /// A natural-key lookup matched more than one row.
    #[error("ambiguous {table} name '{name}': {count} rows match")]
    AmbiguousName {
        table: &'static str,
        name: String,
        count: usize,
    },

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// A metadata file could not be parsed.
    #[error("malformed metadata file {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },
}
