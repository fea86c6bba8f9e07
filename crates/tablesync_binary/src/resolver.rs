//! Pluggable conflict resolution.

use crate::error::{BinaryError, BinaryResult};
use crate::record::{BinaryRecord, LocalFileInfo};

/// Direction picked by a resolver, carrying the bare reason stripped
/// from its action tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAction {
    /// Push the local payload.
    Upload(String),
    /// Pull the server payload.
    Download(String),
}

impl ResolvedAction {
    /// Rebuilds the full action tag, e.g. `upload-conflictlocal`.
    pub fn tag(&self) -> String {
        match self {
            ResolvedAction::Upload(reason) => format!("upload-{reason}"),
            ResolvedAction::Download(reason) => format!("download-{reason}"),
        }
    }
}

/// Parses an action tag of the form `upload-<reason>` or
/// `download-<reason>` into its direction and reason.
///
/// # Errors
///
/// Returns [`BinaryError::ConflictResolution`] on any other shape.
pub fn parse_action_tag(uid: &str, tag: &str) -> BinaryResult<ResolvedAction> {
    if let Some(reason) = tag.strip_prefix("upload-").filter(|r| !r.is_empty()) {
        return Ok(ResolvedAction::Upload(reason.to_string()));
    }
    if let Some(reason) = tag.strip_prefix("download-").filter(|r| !r.is_empty()) {
        return Ok(ResolvedAction::Download(reason.to_string()));
    }
    Err(BinaryError::conflict(
        uid,
        format!("unusable action tag {tag:?}"),
    ))
}

/// Decides the direction when both sides changed an attachment.
///
/// Implementations may consult the user; the reconciler awaits the
/// answer per record and isolates failures to that record.
#[allow(async_fn_in_trait)]
pub trait ConflictResolver: Send + Sync {
    /// Returns an action tag (`upload-<reason>` or `download-<reason>`)
    /// for the conflicting attachment.
    ///
    /// # Errors
    ///
    /// Any error aborts reconciliation of this record only.
    async fn resolve(
        &self,
        local: &LocalFileInfo,
        server: &BinaryRecord,
    ) -> BinaryResult<String>;
}

/// Default resolver: the local payload wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLocalResolver;

impl ConflictResolver for KeepLocalResolver {
    async fn resolve(
        &self,
        _local: &LocalFileInfo,
        _server: &BinaryRecord,
    ) -> BinaryResult<String> {
        Ok("upload-conflictlocal".to_string())
    }
}
