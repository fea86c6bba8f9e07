//! Sync engine error types.

use tablesync_store::StoreError;
use thiserror::Error;

/// Errors produced while syncing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local storage operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A remote round trip failed.
    #[error("transport failure: {message}")]
    Transport {
        /// What went wrong.
        message: String,
        /// Whether retrying the same call may succeed.
        retryable: bool,
    },

    /// Clock calibration could not converge; syncing with an unreliable
    /// clock would stamp batches on the wrong timeline.
    #[error("clock skew still {residual_ms} ms after {rounds} calibration rounds")]
    ClockSkew {
        /// Residual delta of the last round, in milliseconds.
        residual_ms: i64,
        /// Rounds attempted.
        rounds: u32,
    },

    /// The server schema could not be fetched or decoded.
    #[error("schema unavailable: {message}")]
    SchemaUnavailable {
        /// What went wrong.
        message: String,
    },

    /// Local persistence of sync bookkeeping failed.
    #[error("sync storage failure: {message}")]
    Storage {
        /// What went wrong.
        message: String,
    },

    /// A sync cycle was already running and the deferral budget ran out.
    #[error("sync already in progress")]
    Busy,
}

impl SyncError {
    /// Builds a retryable transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Builds a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        SyncError::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Builds a schema availability error.
    pub fn schema_unavailable(message: impl Into<String>) -> Self {
        SyncError::SchemaUnavailable {
            message: message.into(),
        }
    }

    /// Builds a bookkeeping storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        SyncError::Storage {
            message: message.into(),
        }
    }

    /// Whether retrying the whole cycle can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Busy => true,
            SyncError::ClockSkew { .. } => true,
            SyncError::SchemaUnavailable { .. } => true,
            SyncError::Store(_) | SyncError::Storage { .. } => false,
        }
    }
}

impl From<tablesync_core::CoreError> for SyncError {
    fn from(err: tablesync_core::CoreError) -> Self {
        SyncError::Store(StoreError::from(err))
    }
}

/// Convenience alias for sync results.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_retryability_is_carried() {
        assert!(SyncError::transport("timeout").is_retryable());
        assert!(!SyncError::transport_fatal("bad request").is_retryable());
    }

    #[test]
    fn local_failures_are_not_retryable() {
        assert!(!SyncError::storage("corrupt queue row").is_retryable());
        let store = SyncError::from(StoreError::validation("bad condition"));
        assert!(!store.is_retryable());
    }
}
