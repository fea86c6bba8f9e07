//! Local binary storage contract and an in-memory implementation.

use crate::error::{BinaryError, BinaryResult};
use crate::record::{checksum_hex, BinaryRecord, LastSyncRecord, LocalFileInfo};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where attachment payloads, cached records and last-sync digests live
/// on the client.
///
/// # Invariants
///
/// * `prepare` runs before any other method.
/// * `mark_reconciled` records the digest both sides agreed on; it is
///   only called after a transfer completed.
pub trait BinaryStore: Send + Sync {
    /// Installs the namespace isolating this account's files.
    ///
    /// # Errors
    ///
    /// Fails when the backing storage cannot be opened.
    fn prepare(&self, namespace: &str) -> BinaryResult<()>;

    /// Stores a payload and caches its record.
    ///
    /// # Errors
    ///
    /// Fails when the payload cannot be persisted.
    fn save_binary(&self, record: &BinaryRecord, payload: &[u8]) -> BinaryResult<()>;

    /// Returns the local payload info and the last-sync digest, either of
    /// which may be absent.
    ///
    /// # Errors
    ///
    /// Fails when local storage cannot be read.
    fn local_infos(
        &self,
        record: &BinaryRecord,
    ) -> BinaryResult<(Option<LocalFileInfo>, Option<LastSyncRecord>)>;

    /// Returns the local payload bytes.
    ///
    /// # Errors
    ///
    /// Fails with [`BinaryError::MissingPayload`] when nothing is stored.
    fn file_buffer(&self, record: &BinaryRecord) -> BinaryResult<Vec<u8>>;

    /// Materializes the payload at a filesystem path an external viewer
    /// can open.
    ///
    /// # Errors
    ///
    /// Fails when the payload is absent or cannot be written out.
    fn open_file(&self, record: &BinaryRecord) -> BinaryResult<PathBuf>;

    /// Records the digest of the last successful reconciliation.
    ///
    /// # Errors
    ///
    /// Fails when the digest cannot be persisted.
    fn mark_reconciled(&self, record: &BinaryRecord, checksum: &str) -> BinaryResult<()>;

    /// Caches a record without touching the payload.
    ///
    /// # Errors
    ///
    /// Fails when the record cannot be persisted.
    fn save_record(&self, record: &BinaryRecord) -> BinaryResult<()>;

    /// All cached records.
    ///
    /// # Errors
    ///
    /// Fails when the record cache cannot be read.
    fn cached_records(&self) -> BinaryResult<Vec<BinaryRecord>>;
}

/// In-memory [`BinaryStore`].
pub struct MemoryBinaryStore {
    inner: Mutex<StoreState>,
}

struct StoreState {
    namespace: String,
    records: BTreeMap<String, BinaryRecord>,
    payloads: BTreeMap<String, Vec<u8>>,
    last_sync: BTreeMap<String, LastSyncRecord>,
    ready: bool,
}

impl Default for MemoryBinaryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBinaryStore {
    /// An empty store; call [`BinaryStore::prepare`] before use.
    pub fn new() -> Self {
        MemoryBinaryStore {
            inner: Mutex::new(StoreState {
                namespace: String::new(),
                records: BTreeMap::new(),
                payloads: BTreeMap::new(),
                last_sync: BTreeMap::new(),
                ready: false,
            }),
        }
    }
}

impl StoreState {
    fn ensure_ready(&self) -> BinaryResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(BinaryError::store("binary store used before prepare"))
        }
    }
}

impl BinaryStore for MemoryBinaryStore {
    fn prepare(&self, namespace: &str) -> BinaryResult<()> {
        let mut state = self.inner.lock();
        state.namespace = namespace.to_string();
        state.ready = true;
        Ok(())
    }

    fn save_binary(&self, record: &BinaryRecord, payload: &[u8]) -> BinaryResult<()> {
        let mut state = self.inner.lock();
        state.ensure_ready()?;
        state.payloads.insert(record.uid.clone(), payload.to_vec());
        state.records.insert(record.uid.clone(), record.clone());
        Ok(())
    }

    fn local_infos(
        &self,
        record: &BinaryRecord,
    ) -> BinaryResult<(Option<LocalFileInfo>, Option<LastSyncRecord>)> {
        let state = self.inner.lock();
        state.ensure_ready()?;
        let local = state.payloads.get(&record.uid).map(|payload| LocalFileInfo {
            checksum: checksum_hex(payload),
            payload: payload.clone(),
        });
        let last_sync = state.last_sync.get(&record.uid).cloned();
        Ok((local, last_sync))
    }

    fn file_buffer(&self, record: &BinaryRecord) -> BinaryResult<Vec<u8>> {
        let state = self.inner.lock();
        state.ensure_ready()?;
        state
            .payloads
            .get(&record.uid)
            .cloned()
            .ok_or_else(|| BinaryError::missing_payload(&record.uid))
    }

    fn open_file(&self, record: &BinaryRecord) -> BinaryResult<PathBuf> {
        let payload = self.file_buffer(record)?;
        let namespace = self.inner.lock().namespace.clone();
        let path = std::env::temp_dir().join(format!(
            "{namespace}-{}-{}",
            record.uid, record.filename
        ));
        std::fs::write(&path, payload).map_err(|err| BinaryError::store(err.to_string()))?;
        Ok(path)
    }

    fn mark_reconciled(&self, record: &BinaryRecord, checksum: &str) -> BinaryResult<()> {
        let mut state = self.inner.lock();
        state.ensure_ready()?;
        state.last_sync.insert(
            record.uid.clone(),
            LastSyncRecord {
                checksum: checksum.to_string(),
            },
        );
        Ok(())
    }

    fn save_record(&self, record: &BinaryRecord) -> BinaryResult<()> {
        let mut state = self.inner.lock();
        state.ensure_ready()?;
        state.records.insert(record.uid.clone(), record.clone());
        Ok(())
    }

    fn cached_records(&self) -> BinaryResult<Vec<BinaryRecord>> {
        let state = self.inner.lock();
        state.ensure_ready()?;
        Ok(state.records.values().cloned().collect())
    }
}
