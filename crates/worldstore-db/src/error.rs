//! Error types for the backend layer.
//!
//! Backend code propagates [`DbError`], which wraps the underlying
//! [`mongodb`], [`sqlx`], and [`fred`] errors. At the connector boundary
//! every [`DbError`] is converted into a [`ConnectorFailure`]: handle
//! acquisition problems become `BackendUnavailable`, everything else
//! becomes `Backend`.

use worldstore_core::ConnectorFailure;

/// Errors that can occur in the backend layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A backend handle could not be established.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A `MongoDB` operation failed.
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// A value could not be converted to BSON.
    #[error("BSON encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record is missing a field or has the wrong shape.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for ConnectorFailure {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Unavailable(reason) => Self::BackendUnavailable(reason),
            other => Self::Backend(other.to_string()),
        }
    }
}
