//! Binary attachment records and checksums.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tablesync_core::now_millis;

/// Metadata of one binary attachment, shared between client and server.
///
/// The payload itself is never part of the record; both sides compare
/// content through [`checksum_hex`] digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRecord {
    /// Attachment id.
    pub uid: String,
    /// Table of the record this attachment belongs to.
    pub table_name: String,
    /// Key of the record this attachment belongs to.
    pub table_uid: String,
    /// Original file name.
    pub filename: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Digest of the canonical server payload; absent while nothing was
    /// ever uploaded.
    pub checksum: Option<String>,
    /// Creation time in milliseconds.
    pub creation_datetime_ms: i64,
}

impl BinaryRecord {
    /// A fresh record with no server checksum yet.
    pub fn new(
        uid: impl Into<String>,
        table_name: impl Into<String>,
        table_uid: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        BinaryRecord {
            uid: uid.into(),
            table_name: table_name.into(),
            table_uid: table_uid.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            checksum: None,
            creation_datetime_ms: now_millis(),
        }
    }
}

/// A locally stored payload with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileInfo {
    /// The payload bytes.
    pub payload: Vec<u8>,
    /// Digest of the payload.
    pub checksum: String,
}

/// The digest recorded at the last successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSyncRecord {
    /// Digest both sides agreed on.
    pub checksum: String,
}

/// SHA-256 digest as lowercase hex.
pub fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        assert_eq!(checksum_hex(b"abc"), checksum_hex(b"abc"));
        assert_ne!(checksum_hex(b"abc"), checksum_hex(b"abd"));
        assert_eq!(
            checksum_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn records_round_trip_through_json() {
        let record = BinaryRecord::new("b1", "report", "r1", "summary.pdf", "application/pdf");
        let text = serde_json::to_string(&record).unwrap();
        let back: BinaryRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
