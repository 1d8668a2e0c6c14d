//! Errors raised by the SQLite layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("cannot create database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A row that must exist for the operation was missing.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The row exists but its current status forbids the write.
    #[error("{entity} '{id}' is {status}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
    },

    /// Stored JSON could not be encoded or decoded.
    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A thread panicked while holding the connection.
    #[error("database connection lock poisoned")]
    LockPoisoned,
}
