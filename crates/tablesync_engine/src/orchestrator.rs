//! The sync cycle orchestrator.

use crate::clock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::meta::with_meta_tables;
use crate::queue::ChangeQueue;
use crate::remote::{RemoteEndpoint, RemoteRead};
use crate::schema_cache::SchemaCache;
use crate::state::{SyncReport, SyncState};
use crate::versions::VersionTracker;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tablesync_core::{
    record_value, ChangeBatch, ChangeEntry, Record, Schema, TableSchema, Tombstone, TABLE_VERSION,
};
use tablesync_store::{PrepareOptions, StorageEngine};

/// Drives offline data through upload, calibration, schema check,
/// download and apply, one cycle at a time.
///
/// Local mutations go through [`SyncEngine::stage_changes`], which
/// applies them to the store and queues them durably; [`SyncEngine::sync`]
/// later drains the queue and pulls server deltas.
pub struct SyncEngine<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
    config: SyncConfig,
    queue: ChangeQueue<S>,
    versions: VersionTracker<S>,
    schema_cache: SchemaCache<S>,
    state: RwLock<SyncState>,
}

impl<S: StorageEngine, R: RemoteEndpoint> SyncEngine<S, R> {
    /// Prepares the store (schema plus reserved bookkeeping tables) and
    /// builds the engine. A cached schema newer than the provided one
    /// wins, so a reloaded client keeps the schema it last synced
    /// against.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be prepared.
    pub fn new(store: Arc<S>, remote: Arc<R>, config: SyncConfig, schema: Schema) -> SyncResult<Self> {
        store.prepare(PrepareOptions {
            namespace: config.namespace.clone(),
            schema: with_meta_tables(schema.clone()),
        })?;
        let engine = SyncEngine {
            queue: ChangeQueue::new(Arc::clone(&store)),
            versions: VersionTracker::new(Arc::clone(&store)),
            schema_cache: SchemaCache::new(Arc::clone(&store)),
            store,
            remote,
            config,
            state: RwLock::new(SyncState::Idle),
        };
        if let Some(cached) = engine.schema_cache.load()? {
            if cached.version > schema.version {
                engine.store.set_schema(with_meta_tables(cached))?;
            }
        }
        Ok(engine)
    }

    /// Current cycle phase.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Applies local mutations atomically and queues them for upload.
    /// Returns the queued batch, whose entries carry the records as
    /// stored (with stamped revisions, `Auto` resolved).
    ///
    /// # Errors
    ///
    /// Fails without queueing anything when local application fails.
    pub fn stage_changes(&self, entries: Vec<ChangeEntry>) -> SyncResult<ChangeBatch> {
        let applied = self.store.transactional_changes(entries)?;
        let batch = ChangeBatch::new(applied);
        self.queue.enqueue(&batch)?;
        Ok(batch)
    }

    /// Number of batches waiting for upload.
    ///
    /// # Errors
    ///
    /// Fails when the queue cannot be read.
    pub fn pending_batches(&self) -> SyncResult<usize> {
        self.queue.pending()
    }

    /// Runs one full sync cycle over all sync-eligible tables.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; on failure the queue and cursors keep their
    /// pre-cycle values for everything not yet acknowledged or applied.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        self.sync_scoped(None).await
    }

    /// Runs one sync cycle restricted to the given tables (expanded with
    /// view composition sources).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`SyncEngine::sync`].
    pub async fn sync_tables(&self, tables: &[&str]) -> SyncResult<SyncReport> {
        self.sync_scoped(Some(tables.iter().map(|t| t.to_string()).collect()))
            .await
    }

    /// Narrow-scope sync meant to run right before reading the given
    /// tables.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`SyncEngine::sync`].
    pub async fn sync_then(&self, tables: &[&str]) -> SyncResult<SyncReport> {
        self.sync_tables(tables).await
    }

    async fn sync_scoped(&self, scope: Option<Vec<String>>) -> SyncResult<SyncReport> {
        let mut attempt = 0u32;
        while !self.try_begin() {
            attempt += 1;
            if attempt > self.config.busy_max_retries {
                return Err(SyncError::Busy);
            }
            tokio::time::sleep(self.config.busy_retry_delay).await;
        }
        let result = self.run_cycle(scope).await;
        self.set_state(SyncState::Idle);
        result
    }

    fn try_begin(&self) -> bool {
        let mut state = self.state.write();
        if state.can_start_sync() {
            *state = SyncState::Uploading;
            true
        } else {
            false
        }
    }

    fn set_state(&self, next: SyncState) {
        let mut state = self.state.write();
        if *state != next {
            tracing::debug!(from = %state, to = %next, "sync state");
            *state = next;
        }
    }

    async fn run_cycle(&self, scope: Option<Vec<String>>) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        self.upload_phase(&mut report).await?;

        self.set_state(SyncState::SchemaChecking);
        self.check_schema().await?;

        self.set_state(SyncState::Downloading);
        let tables = self.download_scope(scope)?;
        if tables.is_empty() {
            return Ok(report);
        }
        let server_versions = self.remote.table_versions(&tables).await?;
        let schema = self.store.schema()?;

        // (table, effective cursor, server version) triples needing a fetch.
        let mut plan: Vec<(String, i64, i64)> = Vec::new();
        for tv in &server_versions {
            let mut cursor = self.versions.version_of(&tv.table)?;
            if tv.force_refresh_floor > cursor {
                cursor = -1;
            }
            if tv.version > cursor {
                plan.push((tv.table.clone(), cursor, tv.version));
            }
        }
        if plan.is_empty() {
            return Ok(report);
        }

        let reads: Vec<RemoteRead> = plan
            .iter()
            .map(|(table, cursor, _)| {
                let table_schema = schema.table(table)?;
                Ok(RemoteRead {
                    table: table.clone(),
                    condition: delta_condition(table_schema, *cursor),
                    tombstones_after: (*cursor >= 0).then_some(*cursor),
                })
            })
            .collect::<SyncResult<_>>()?;
        let results = self.remote.multiread(&reads).await?;

        self.set_state(SyncState::Applying);
        let mut entries: Vec<ChangeEntry> = Vec::new();
        let mut new_cursors: BTreeMap<String, i64> = BTreeMap::new();
        for (table, cursor, server_version) in &plan {
            let table_schema = schema.table(table)?;
            let full_refresh = *cursor < 0;
            if full_refresh {
                entries.push(ChangeEntry::RemoveWhere {
                    table: table.clone(),
                    condition: Value::Null,
                });
            }
            let mut observed: Option<i64> = None;
            for row in results.rows.get(table).cloned().unwrap_or_default() {
                let version = observed_version(table_schema, &row);
                observed = Some(observed.map_or(version, |v| v.max(version)));
                entries.push(if full_refresh {
                    ChangeEntry::Insert {
                        table: table.clone(),
                        record: row,
                    }
                } else {
                    ChangeEntry::Auto {
                        table: table.clone(),
                        record: row,
                    }
                });
                report.downloaded_rows += 1;
            }
            for tombstone in results.tombstones.get(table).cloned().unwrap_or_default() {
                observed = Some(observed.map_or(tombstone.table_version, |v| {
                    v.max(tombstone.table_version)
                }));
                entries.push(ChangeEntry::Remove {
                    table: table.clone(),
                    record: tombstone_record(table_schema, &tombstone)?,
                });
                report.removed_rows += 1;
            }
            // An empty full fetch still settles on the server version so
            // the table is not refetched every cycle.
            let next = match observed {
                Some(version) => version,
                None if full_refresh => *server_version,
                None => *cursor,
            };
            new_cursors.insert(table.clone(), next);
            report.tables_synced.push(table.clone());
        }

        if !entries.is_empty() {
            self.store.transactional_changes(entries)?;
        }
        // Cursors move only after the local transaction committed.
        for (table, version) in new_cursors {
            self.versions.advance(&table, version)?;
        }
        tracing::info!(
            uploaded = report.uploaded_batches,
            downloaded = report.downloaded_rows,
            removed = report.removed_rows,
            "sync cycle finished"
        );
        Ok(report)
    }

    async fn upload_phase(&self, report: &mut SyncReport) -> SyncResult<()> {
        if self.queue.pending()? == 0 {
            return Ok(());
        }
        self.set_state(SyncState::ClockCalibrating);
        let skew = clock::calibrate(self.remote.as_ref(), &self.config).await?;

        self.set_state(SyncState::Uploading);
        while let Some(mut batch) = self.queue.peek_oldest()? {
            batch.clock_skew = Some(skew);
            let outcome = self.remote.submit_changes(&batch).await?;
            // Dequeue only after the server acknowledged the batch.
            self.queue.remove_oldest()?;
            report.uploaded_batches += 1;
            if outcome.should_refresh {
                for table in batch.tables() {
                    self.versions.force_refresh(table)?;
                }
            }
        }
        Ok(())
    }

    async fn check_schema(&self) -> SyncResult<()> {
        let server_version = self.remote.schema_version().await?;
        let local = self.store.schema()?;
        if local.version == server_version {
            return Ok(());
        }
        tracing::info!(
            local = local.version,
            server = server_version,
            "schema version changed, refetching"
        );
        let fresh = self.remote.fetch_schema().await?;
        let fresh = with_meta_tables(fresh);
        self.store.set_schema(fresh.clone())?;
        self.schema_cache.store(&fresh)?;
        Ok(())
    }

    fn download_scope(&self, scope: Option<Vec<String>>) -> SyncResult<Vec<String>> {
        let schema = self.store.schema()?;
        let base: Vec<String> = match scope {
            Some(tables) => tables,
            None => schema
                .table_names()
                .filter(|t| self.config.is_sync_eligible(t))
                .map(str::to_string)
                .collect(),
        };
        let mut expanded: BTreeSet<String> = BTreeSet::new();
        for table in base {
            if !self.config.is_sync_eligible(&table) {
                continue;
            }
            if let Ok(table_schema) = schema.table(&table) {
                for source in &table_schema.view_of {
                    if self.config.is_sync_eligible(&source.table) {
                        expanded.insert(source.table.clone());
                    }
                }
            }
            expanded.insert(table);
        }
        Ok(expanded.into_iter().collect())
    }
}

/// Version column a view row carries for one of its source tables.
fn source_version_column(source_table: &str, explicit: Option<&str>) -> String {
    match explicit {
        Some(column) => column.to_string(),
        None => format!("{TABLE_VERSION}_{source_table}"),
    }
}

/// Delta condition selecting rows newer than the cursor; null means a
/// full fetch.
fn delta_condition(table: &TableSchema, cursor: i64) -> Value {
    if cursor < 0 {
        return Value::Null;
    }
    if table.view_of.is_empty() {
        return json!({ TABLE_VERSION: {"ope": ">", "value": cursor} });
    }
    let branches: Vec<Value> = table
        .view_of
        .iter()
        .map(|source| {
            let column = source_version_column(&source.table, source.version_column.as_deref());
            json!({ column: {"ope": ">", "value": cursor} })
        })
        .collect();
    json!({ "$or": branches })
}

/// The table version a downloaded row advances the cursor to.
fn observed_version(table: &TableSchema, row: &Record) -> i64 {
    let base = record_value(row, TABLE_VERSION)
        .and_then(Value::as_i64)
        .unwrap_or(-1);
    if table.view_of.is_empty() {
        return base;
    }
    table
        .view_of
        .iter()
        .filter_map(|source| {
            let column = source_version_column(&source.table, source.version_column.as_deref());
            record_value(row, &column).and_then(Value::as_i64)
        })
        .fold(base, i64::max)
}

/// Rebuilds the primary-key record a tombstone removal applies to.
fn tombstone_record(table: &TableSchema, tombstone: &Tombstone) -> SyncResult<Record> {
    if tombstone.pk.len() != table.pk.len() {
        return Err(SyncError::transport_fatal(format!(
            "tombstone for {} carries {} key value(s), table has {}",
            table.name,
            tombstone.pk.len(),
            table.pk.len()
        )));
    }
    let mut record = Record::new();
    for (column, value) in table.pk.iter().zip(&tombstone.pk) {
        record.insert(column.clone(), value.clone());
    }
    Ok(record)
}
