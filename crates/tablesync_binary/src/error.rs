//! Binary reconciliation error types.

use thiserror::Error;

/// Errors produced while reconciling binary attachments.
#[derive(Debug, Error)]
pub enum BinaryError {
    /// A record or request was malformed.
    #[error("invalid binary operation: {message}")]
    Validation {
        /// What went wrong.
        message: String,
    },

    /// A remote transfer failed.
    #[error("binary transport failure: {message}")]
    Transport {
        /// What went wrong.
        message: String,
    },

    /// The conflict resolver failed or returned an unusable action tag.
    #[error("conflict resolution failed for {uid}: {message}")]
    ConflictResolution {
        /// The binary record's uid.
        uid: String,
        /// What went wrong.
        message: String,
    },

    /// Local binary storage failed.
    #[error("binary store failure: {message}")]
    Store {
        /// What went wrong.
        message: String,
    },

    /// An upload was requested but no local payload exists.
    #[error("no local payload for binary {uid}")]
    MissingPayload {
        /// The binary record's uid.
        uid: String,
    },
}

impl BinaryError {
    /// Builds a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        BinaryError::Validation {
            message: message.into(),
        }
    }

    /// Builds a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        BinaryError::Transport {
            message: message.into(),
        }
    }

    /// Builds a conflict resolution error for one record.
    pub fn conflict(uid: impl Into<String>, message: impl Into<String>) -> Self {
        BinaryError::ConflictResolution {
            uid: uid.into(),
            message: message.into(),
        }
    }

    /// Builds a store error.
    pub fn store(message: impl Into<String>) -> Self {
        BinaryError::Store {
            message: message.into(),
        }
    }

    /// Builds a missing-payload error.
    pub fn missing_payload(uid: impl Into<String>) -> Self {
        BinaryError::MissingPayload { uid: uid.into() }
    }
}

/// Convenience alias for binary reconciliation results.
pub type BinaryResult<T> = Result<T, BinaryError>;
