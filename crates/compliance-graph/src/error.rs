//! Error types for the compliance graph store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed or out-of-range input, rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// A foreign-key style reference to reference data that does not exist
    #[error("{kind} not found: {key}")]
    ReferenceNotFound { kind: &'static str, key: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The backing store is unreachable, busy past its timeout, or failed mid-operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored value no longer decodes into its model type
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl GraphError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GraphError::Validation(msg.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, GraphError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for GraphError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // Lookups by key use fetch_optional; a missing row here is a broken read
            sqlx::Error::RowNotFound => GraphError::Corrupt("expected row is missing".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                GraphError::Corrupt(err.to_string())
            }
            other => GraphError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Corrupt(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for GraphError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GraphError::StoreUnavailable("store operation timed out".to_string())
    }
}
