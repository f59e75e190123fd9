use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by persistence gateways.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    /// The backend refuses documents over its size limit.
    #[error("Document {document} is {size} bytes, limit is {limit}")]
    DocumentTooLarge {
        document: String,
        size: usize,
        limit: usize,
    },

    /// A concurrent writer touched the same record; safe to retry.
    #[error("Write conflict on {0}")]
    Conflict(String),

    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),
}

impl GatewayError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GatewayError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<surrealdb::Error> for GatewayError {
    fn from(err: surrealdb::Error) -> Self {
        GatewayError::Database(err.to_string())
    }
}
