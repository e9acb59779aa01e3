//! Error types for discdrawer.
//!
//! This module defines the crate-wide error type together with the error type
//! reported by throw stores. Expected runtime conditions (denied location
//! authorization, signal loss, marking without a fix) are modelled as values
//! elsewhere and never show up here.

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::DiscRef;

/// Errors reported by a [`ThrowStore`](crate::storage::ThrowStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or is temporarily unusable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The referenced catalog entry does not exist.
    #[error("unknown catalog entry: disc {0}")]
    UnknownEntry(DiscRef),

    /// The record was refused by the store.
    #[error("record rejected: {0}")]
    Rejected(String),

    /// The storage backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The main error type for discdrawer operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A record looked up by id does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// The kind of record.
        kind: &'static str,
        /// The id that was looked up.
        id: i64,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Location Errors ===
    /// A coordinate was outside the WGS-84 range or not finite.
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// The offending latitude.
        latitude: f64,
        /// The offending longitude.
        longitude: f64,
    },

    /// The position source has shut down and no more positions will arrive.
    #[error("position stream closed")]
    PositionStreamClosed,

    /// A location provider failed in a way that cannot be reported as a fault.
    #[error("location provider '{name}' failed: {message}")]
    Provider {
        /// Name of the provider.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Session Errors ===
    /// Saving a completed measurement failed. The session keeps its frozen
    /// distance and the save can be retried.
    #[error("failed to save measured throw: {0}")]
    Persistence(#[source] StoreError),

    // === Power Errors ===
    /// The idle inhibitor could not be engaged.
    #[error("idle inhibitor error: {0}")]
    Inhibitor(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for discdrawer operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new provider error.
    #[must_use]
    pub fn provider(name: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            name,
            message: message.into(),
        }
    }

    /// Create a not-found error for the given record kind.
    #[must_use]
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Check if the failed operation can be retried as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Check if this error means a record was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
