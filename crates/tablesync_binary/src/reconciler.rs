//! Drives each cached attachment to agreement with the server.

use crate::decision::{decide, Decision};
use crate::error::{BinaryError, BinaryResult};
use crate::record::BinaryRecord;
use crate::remote::BinaryEndpoint;
use crate::resolver::{parse_action_tag, ConflictResolver, KeepLocalResolver, ResolvedAction};
use crate::store::BinaryStore;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use tablesync_core::Record;
use tablesync_store::Condition;
use tracing::{debug, warn};

const IN_FLIGHT_RETRY_DELAY: Duration = Duration::from_millis(50);
const IN_FLIGHT_MAX_RETRIES: u32 = 100;

/// Outcome tallies of a reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Attachments whose local payload became canonical.
    pub uploaded: usize,
    /// Attachments refreshed from the server.
    pub downloaded: usize,
    /// Attachments already in agreement, or gone from the server.
    pub skipped: usize,
    /// Attachments left untouched because another pass held them.
    pub deferred: usize,
    /// Per-attachment failures, keyed by uid.
    pub failures: BTreeMap<String, String>,
}

/// Reconciles binary attachments between a [`BinaryStore`] and a
/// [`BinaryEndpoint`], consulting `R` when both sides diverged from the
/// last agreed digest.
pub struct BinaryReconciler<S, E, R = KeepLocalResolver> {
    store: S,
    remote: E,
    resolver: R,
    in_flight: Mutex<BTreeSet<String>>,
    excluded_tables: Vec<String>,
}

impl<S, E> BinaryReconciler<S, E, KeepLocalResolver>
where
    S: BinaryStore,
    E: BinaryEndpoint,
{
    /// A reconciler that keeps the local payload on conflict.
    pub fn new(store: S, remote: E) -> Self {
        Self::with_resolver(store, remote, KeepLocalResolver)
    }
}

impl<S, E, R> BinaryReconciler<S, E, R>
where
    S: BinaryStore,
    E: BinaryEndpoint,
    R: ConflictResolver,
{
    /// A reconciler delegating conflicts to `resolver`.
    pub fn with_resolver(store: S, remote: E, resolver: R) -> Self {
        BinaryReconciler {
            store,
            remote,
            resolver,
            in_flight: Mutex::new(BTreeSet::new()),
            excluded_tables: Vec::new(),
        }
    }

    /// Tables whose attachments full passes leave alone.
    #[must_use]
    pub fn with_excluded_tables(mut self, tables: &[&str]) -> Self {
        self.excluded_tables = tables.iter().map(|t| (*t).to_string()).collect();
        self
    }

    /// Borrow of the local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconciles every cached attachment outside the excluded tables.
    /// Attachments held by a concurrent pass get one retry at the end;
    /// still-held ones are reported as deferred.
    ///
    /// # Errors
    ///
    /// Fails only when the record cache itself cannot be read. Transfer
    /// failures are isolated into the report.
    pub async fn reconcile_all(&self) -> BinaryResult<ReconcileReport> {
        let exclusion = Condition::parse(&json!({
            "table_name": { "ope": "not in", "value": self.excluded_tables }
        }))
        .map_err(|err| BinaryError::store(err.to_string()))?;

        let mut targets = Vec::new();
        for record in self.store.cached_records()? {
            let row = record_row(&record)?;
            if exclusion.matches(&row) {
                targets.push(record);
            }
        }

        let mut report = ReconcileReport::default();
        let mut held = Vec::new();
        for record in &targets {
            match self.reconcile_one(record, &mut report).await {
                Ok(true) => {}
                Ok(false) => held.push(record),
                Err(err) => {
                    warn!(uid = %record.uid, error = %err, "attachment reconciliation failed");
                    report.failures.insert(record.uid.clone(), err.to_string());
                }
            }
        }
        for record in held {
            match self.reconcile_one(record, &mut report).await {
                Ok(true) => {}
                Ok(false) => report.deferred += 1,
                Err(err) => {
                    warn!(uid = %record.uid, error = %err, "attachment reconciliation failed");
                    report.failures.insert(record.uid.clone(), err.to_string());
                }
            }
        }
        Ok(report)
    }

    /// Reconciles a single attachment. When another pass already holds
    /// the attachment, the request waits and retries until the holder
    /// finishes instead of duplicating transfers.
    ///
    /// # Errors
    ///
    /// Fails on transfer or storage errors, or when the attachment stays
    /// held past the retry budget.
    pub async fn reconcile(&self, record: &BinaryRecord) -> BinaryResult<()> {
        let mut report = ReconcileReport::default();
        let mut attempt = 0u32;
        loop {
            if self.reconcile_one(record, &mut report).await? {
                return Ok(());
            }
            attempt += 1;
            if attempt > IN_FLIGHT_MAX_RETRIES {
                return Err(BinaryError::store(format!(
                    "attachment {} stayed in flight through {IN_FLIGHT_MAX_RETRIES} retries",
                    record.uid
                )));
            }
            tokio::time::sleep(IN_FLIGHT_RETRY_DELAY).await;
        }
    }

    /// Reconciles `record` and materializes its payload for an external
    /// viewer. `wait` bounds only the reconciliation; on timeout whatever
    /// payload is already local is opened instead.
    ///
    /// # Errors
    ///
    /// Fails when no payload exists locally after the attempt.
    pub async fn open_latest(
        &self,
        record: &BinaryRecord,
        wait: Option<Duration>,
    ) -> BinaryResult<PathBuf> {
        let attempt = self.reconcile(record);
        let outcome = match wait {
            Some(limit) => tokio::time::timeout(limit, attempt).await.ok(),
            None => Some(attempt.await),
        };
        if let Some(Err(err)) = outcome {
            debug!(uid = %record.uid, error = %err, "opening stale payload");
        }
        self.store.open_file(record)
    }

    /// Returns `Ok(false)` when the attachment is held by another pass.
    async fn reconcile_one(
        &self,
        record: &BinaryRecord,
        report: &mut ReconcileReport,
    ) -> BinaryResult<bool> {
        if !self.in_flight.lock().insert(record.uid.clone()) {
            return Ok(false);
        }
        let outcome = self.run_decision(record, report).await;
        self.in_flight.lock().remove(&record.uid);
        outcome.map(|()| true)
    }

    async fn run_decision(
        &self,
        record: &BinaryRecord,
        report: &mut ReconcileReport,
    ) -> BinaryResult<()> {
        let Some(server_record) = self.remote.fetch_record(&record.uid).await? else {
            debug!(uid = %record.uid, "attachment vanished from the server");
            report.skipped += 1;
            return Ok(());
        };
        let (local, last_sync) = self.store.local_infos(record)?;
        let local_checksum = local.as_ref().map(|info| info.checksum.as_str());
        let last_checksum = last_sync.as_ref().map(|sync| sync.checksum.as_str());
        let server_checksum = server_record.checksum.as_deref();

        match decide(local_checksum, last_checksum, server_checksum) {
            Decision::Skip => {
                // Local and server already agree; repair a stale digest so
                // the next pass skips cheaply too.
                if let (Some(local), true) = (local_checksum, local_checksum != last_checksum) {
                    self.store.mark_reconciled(record, local)?;
                }
                report.skipped += 1;
                Ok(())
            }
            Decision::Upload { reason } => {
                let info = local.ok_or_else(|| BinaryError::missing_payload(&record.uid))?;
                self.upload(record, &info.payload, &info.checksum, reason).await?;
                report.uploaded += 1;
                Ok(())
            }
            Decision::Download { reason } => {
                self.download(record, &format!("download-{reason}")).await?;
                report.downloaded += 1;
                Ok(())
            }
            Decision::Conflict => {
                let info = local.ok_or_else(|| BinaryError::missing_payload(&record.uid))?;
                let tag = self.resolver.resolve(&info, &server_record).await?;
                match parse_action_tag(&record.uid, &tag)? {
                    ResolvedAction::Upload(reason) => {
                        self.upload(record, &info.payload, &info.checksum, &reason).await?;
                        report.uploaded += 1;
                    }
                    ResolvedAction::Download(reason) => {
                        // Trace the losing payload server-side before it is
                        // overwritten; the digest stays unreconciled until
                        // the download lands.
                        let tag = format!("download-{reason}");
                        self.remote
                            .transfer(record, Some(&info.payload), None, &tag)
                            .await?;
                        self.download(record, &tag).await?;
                        report.downloaded += 1;
                    }
                }
                Ok(())
            }
        }
    }

    async fn upload(
        &self,
        record: &BinaryRecord,
        payload: &[u8],
        checksum: &str,
        reason: &str,
    ) -> BinaryResult<()> {
        let tag = format!("upload-{reason}");
        debug!(uid = %record.uid, action = %tag, "uploading attachment");
        let saved = self
            .remote
            .transfer(record, Some(payload), Some(checksum), &tag)
            .await?;
        self.store.save_record(&saved)?;
        self.store.mark_reconciled(record, checksum)
    }

    async fn download(&self, record: &BinaryRecord, action: &str) -> BinaryResult<()> {
        debug!(uid = %record.uid, action = %action, "downloading attachment");
        let payload = self.remote.download(&record.uid).await?;
        let checksum = crate::record::checksum_hex(&payload);
        self.store.save_binary(record, &payload)?;
        self.store.mark_reconciled(record, &checksum)
    }

    #[cfg(test)]
    fn hold(&self, uid: &str) {
        self.in_flight.lock().insert(uid.to_string());
    }

    #[cfg(test)]
    fn release(&self, uid: &str) {
        self.in_flight.lock().remove(uid);
    }
}

fn record_row(record: &BinaryRecord) -> BinaryResult<Record> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(BinaryError::store("attachment record is not an object")),
    }
}
