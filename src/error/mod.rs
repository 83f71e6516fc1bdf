//! Error types for the persistence facade.

use thiserror::Error;

/// Errors surfaced by the database facade and its storage backends.
#[derive(Debug, Error)]
pub enum DbError {
    /// Backend-level failure: connectivity, query or constraint errors.
    #[error("backend error: {0}")]
    Backend(String),

    /// Operation the configured backend does not implement.
    #[error("operation not implemented by this backend: {0}")]
    NotImplemented(&'static str),

    /// An operation ran before a successful connect.
    #[error("database is not connected")]
    NotConnected,

    /// Unknown engine name in the storage configuration.
    #[error("unknown storage engine: {0}")]
    UnknownEngine(String),

    /// Configuration loading failure.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// DuckDB error.
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Document (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DbError>;
