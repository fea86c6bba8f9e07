//! Remote binary endpoint contract plus a scriptable in-memory server.

use crate::error::{BinaryError, BinaryResult};
use crate::record::{checksum_hex, BinaryRecord};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Server side of binary reconciliation.
#[allow(async_fn_in_trait)]
pub trait BinaryEndpoint: Send + Sync {
    /// Reports the outcome of a local decision. `payload` and `checksum`
    /// accompany upload actions; download actions send neither or, for
    /// conflict traces, the losing local payload.
    ///
    /// # Errors
    ///
    /// Fails on transport problems or server rejection.
    async fn transfer(
        &self,
        record: &BinaryRecord,
        payload: Option<&[u8]>,
        checksum: Option<&str>,
        action: &str,
    ) -> BinaryResult<BinaryRecord>;

    /// Fetches the canonical payload bytes.
    ///
    /// # Errors
    ///
    /// Fails on transport problems or when the server has no payload.
    async fn download(&self, uid: &str) -> BinaryResult<Vec<u8>>;

    /// Fetches the current server record, `None` when it vanished.
    ///
    /// # Errors
    ///
    /// Fails on transport problems.
    async fn fetch_record(&self, uid: &str) -> BinaryResult<Option<BinaryRecord>>;
}

/// A transfer observed by [`MockBinaryEndpoint`].
#[derive(Debug, Clone)]
pub struct TransferLog {
    /// Attachment the transfer concerned.
    pub uid: String,
    /// Action tag the client reported.
    pub action: String,
    /// Digest of the payload sent, when one was.
    pub payload_checksum: Option<String>,
}

#[derive(Default)]
struct MockBinaryState {
    records: BTreeMap<String, BinaryRecord>,
    payloads: BTreeMap<String, Vec<u8>>,
    transfers: Vec<TransferLog>,
    fail_next_transfers: usize,
}

/// In-memory [`BinaryEndpoint`] for tests. Only `upload-*` actions move
/// the canonical checksum; conflict traces arriving under a download tag
/// are logged without touching it.
#[derive(Default)]
pub struct MockBinaryEndpoint {
    state: Mutex<MockBinaryState>,
}

impl MockBinaryEndpoint {
    /// An endpoint with no seeded attachments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a server-side attachment with its payload.
    pub fn seed(&self, record: &BinaryRecord, payload: &[u8]) {
        let mut state = self.state.lock();
        let mut record = record.clone();
        record.checksum = Some(checksum_hex(payload));
        state.payloads.insert(record.uid.clone(), payload.to_vec());
        state.records.insert(record.uid.clone(), record);
    }

    /// Seeds a record without a payload, as a freshly announced upload slot.
    pub fn seed_record(&self, record: &BinaryRecord) {
        let mut state = self.state.lock();
        state.records.insert(record.uid.clone(), record.clone());
    }

    /// Removes a record, simulating server-side deletion.
    pub fn remove(&self, uid: &str) {
        let mut state = self.state.lock();
        state.records.remove(uid);
        state.payloads.remove(uid);
    }

    /// Makes the next `count` transfer calls fail.
    pub fn fail_next_transfers(&self, count: usize) {
        self.state.lock().fail_next_transfers = count;
    }

    /// Every transfer call observed so far.
    pub fn transfers(&self) -> Vec<TransferLog> {
        self.state.lock().transfers.clone()
    }

    /// Canonical checksum currently stored for `uid`.
    pub fn server_checksum(&self, uid: &str) -> Option<String> {
        self.state
            .lock()
            .records
            .get(uid)
            .and_then(|record| record.checksum.clone())
    }

    /// Canonical payload currently stored for `uid`.
    pub fn server_payload(&self, uid: &str) -> Option<Vec<u8>> {
        self.state.lock().payloads.get(uid).cloned()
    }
}

impl BinaryEndpoint for MockBinaryEndpoint {
    async fn transfer(
        &self,
        record: &BinaryRecord,
        payload: Option<&[u8]>,
        checksum: Option<&str>,
        action: &str,
    ) -> BinaryResult<BinaryRecord> {
        let mut state = self.state.lock();
        if state.fail_next_transfers > 0 {
            state.fail_next_transfers -= 1;
            return Err(BinaryError::transport("transfer refused"));
        }
        state.transfers.push(TransferLog {
            uid: record.uid.clone(),
            action: action.to_string(),
            payload_checksum: payload.map(checksum_hex),
        });
        let existing = state
            .records
            .entry(record.uid.clone())
            .or_insert_with(|| record.clone())
            .clone();
        if action.starts_with("upload-") {
            if let Some(payload) = payload {
                state.payloads.insert(record.uid.clone(), payload.to_vec());
            }
            let mut updated = existing;
            updated.checksum = checksum
                .map(str::to_string)
                .or_else(|| payload.map(checksum_hex));
            state.records.insert(record.uid.clone(), updated.clone());
            Ok(updated)
        } else {
            Ok(existing)
        }
    }

    async fn download(&self, uid: &str) -> BinaryResult<Vec<u8>> {
        self.state
            .lock()
            .payloads
            .get(uid)
            .cloned()
            .ok_or_else(|| BinaryError::transport(format!("no payload for {uid}")))
    }

    async fn fetch_record(&self, uid: &str) -> BinaryResult<Option<BinaryRecord>> {
        Ok(self.state.lock().records.get(uid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(uid: &str) -> BinaryRecord {
        BinaryRecord::new(uid, "report", "r1", "a.txt", "text/plain")
    }

    #[tokio::test]
    async fn upload_moves_the_canonical_checksum() {
        let remote = MockBinaryEndpoint::new();
        remote.seed_record(&record("b1"));
        let saved = remote
            .transfer(&record("b1"), Some(b"new"), Some(&checksum_hex(b"new")), "upload-new")
            .await
            .unwrap();
        assert_eq!(saved.checksum.as_deref(), Some(checksum_hex(b"new").as_str()));
        assert_eq!(remote.server_payload("b1").unwrap(), b"new");
    }

    #[tokio::test]
    async fn first_upload_registers_record_payload_and_checksum() {
        let remote = MockBinaryEndpoint::new();
        let saved = remote
            .transfer(
                &record("b9"),
                Some(b"fresh"),
                Some(&checksum_hex(b"fresh")),
                "upload-new",
            )
            .await
            .unwrap();
        assert_eq!(saved.checksum.as_deref(), Some(checksum_hex(b"fresh").as_str()));
        assert_eq!(remote.server_payload("b9").unwrap(), b"fresh");
        assert_eq!(
            remote.fetch_record("b9").await.unwrap().unwrap().checksum,
            saved.checksum
        );
    }

    #[tokio::test]
    async fn download_tagged_transfer_leaves_the_checksum_alone() {
        let remote = MockBinaryEndpoint::new();
        remote.seed(&record("b1"), b"server");
        let before = remote.server_checksum("b1");
        remote
            .transfer(&record("b1"), Some(b"losing"), None, "download-conflictlocal")
            .await
            .unwrap();
        assert_eq!(remote.server_checksum("b1"), before);
        assert_eq!(remote.server_payload("b1").unwrap(), b"server");
        assert_eq!(remote.transfers().len(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_transport_errors() {
        let remote = MockBinaryEndpoint::new();
        remote.fail_next_transfers(1);
        let err = remote
            .transfer(&record("b1"), None, None, "download-missing")
            .await
            .unwrap_err();
        assert!(matches!(err, BinaryError::Transport { .. }));
        assert!(remote
            .transfer(&record("b1"), None, None, "download-missing")
            .await
            .is_ok());
    }
}
