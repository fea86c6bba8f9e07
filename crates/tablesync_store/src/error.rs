//! Error types for the storage layer.

use tablesync_core::CoreError;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the query surface and storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed condition, join spec, or query option.
    ///
    /// Validation errors fail fast and must never be retried.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// An update targeted a record that does not exist.
    #[error("record not found in table {table}")]
    RecordNotFound {
        /// Table that was searched.
        table: String,
    },

    /// The local backend failed; the enclosing transaction is aborted.
    #[error("storage backend error: {message}")]
    Storage {
        /// Description of the backend failure.
        message: String,
    },

    /// Schema or record-model error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a backend storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_convert() {
        let err: StoreError = CoreError::unknown_table("x").into();
        assert_eq!(err.to_string(), "unknown table: x");
    }

    #[test]
    fn validation_display() {
        let err = StoreError::validation("unknown operator: ~=");
        assert!(err.to_string().contains("~="));
    }
}
