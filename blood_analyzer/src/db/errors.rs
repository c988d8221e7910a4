//! Credential store error types.

use std::time::Duration;
use thiserror::Error;

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Write rejected by a uniqueness constraint on the named field
    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Operation did not finish in time
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row referenced by id does not exist
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: String },

    /// Stored value could not be decoded
    #[error("Corrupt {column} column: {reason}")]
    Corrupt { column: &'static str, reason: String },
}

impl StoreError {
    /// Translate a unique-index violation on `field` into [`StoreError::Duplicate`].
    pub fn from_insert(err: sqlx::Error, field: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(field)
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for credential store operations
pub type StoreResult<T> = Result<T, StoreError>;
