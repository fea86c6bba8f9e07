//! The transport-agnostic remote contract and a scripted mock server.
//!
//! The engine never talks to a network directly; everything it needs
//! from the server side goes through [`RemoteEndpoint`]. [`MockRemote`]
//! implements the contract over in-process state so cycles can be
//! exercised without any transport.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tablesync_core::{
    now_millis, ChangeBatch, ChangeEntry, Record, Schema, Tombstone, TABLE_VERSION,
};
use tablesync_store::Condition;
use uuid::Uuid;

/// Server response to a submitted change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// The server wants the batch's tables refetched from scratch.
    pub should_refresh: bool,
}

/// Server-side version data for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableVersion {
    /// Table name.
    pub table: String,
    /// Current server table version.
    pub version: i64,
    /// Clients whose cursor is below this floor must refetch fully.
    pub force_refresh_floor: i64,
}

/// One table read inside a remote multiread.
#[derive(Debug, Clone)]
pub struct RemoteRead {
    /// Table to read.
    pub table: String,
    /// Declarative delta condition; null fetches everything.
    pub condition: Value,
    /// When set, also return tombstones with a later table version.
    pub tombstones_after: Option<i64>,
}

/// Rows and tombstones returned by a remote multiread, keyed by table.
#[derive(Debug, Clone, Default)]
pub struct RemoteReadResults {
    /// Matching rows per table.
    pub rows: BTreeMap<String, Vec<Record>>,
    /// Requested tombstones per table.
    pub tombstones: BTreeMap<String, Vec<Tombstone>>,
}

/// What the engine needs from the server side.
///
/// Implementations wrap whatever transport the application uses; the
/// engine only sees these six calls.
#[allow(async_fn_in_trait)]
pub trait RemoteEndpoint: Send + Sync {
    /// Submits one change batch. Must be idempotent per batch id: a
    /// retried batch is acknowledged without being applied twice.
    ///
    /// # Errors
    ///
    /// Transport failures; the caller keeps the batch queued.
    async fn submit_changes(&self, batch: &ChangeBatch) -> SyncResult<SubmitOutcome>;

    /// Returns the server's delta against a proposed timestamp, in
    /// milliseconds.
    ///
    /// # Errors
    ///
    /// Transport failures.
    async fn time_delta(&self, proposed_ms: i64) -> SyncResult<i64>;

    /// Current server schema version.
    ///
    /// # Errors
    ///
    /// Transport failures.
    async fn schema_version(&self) -> SyncResult<i64>;

    /// Fetches the full server schema.
    ///
    /// # Errors
    ///
    /// Transport failures or an undecodable schema.
    async fn fetch_schema(&self) -> SyncResult<Schema>;

    /// Version data for the given tables.
    ///
    /// # Errors
    ///
    /// Transport failures.
    async fn table_versions(&self, tables: &[String]) -> SyncResult<Vec<TableVersion>>;

    /// Runs every read against one consistent server snapshot.
    ///
    /// # Errors
    ///
    /// Transport failures; no partial result is returned.
    async fn multiread(&self, reads: &[RemoteRead]) -> SyncResult<RemoteReadResults>;
}

/// In-process scripted server.
///
/// Holds server tables, versions and a tombstone log; applies submitted
/// batches the way a real server would (stamping table versions,
/// recording deletions) and supports failure injection for tests.
pub struct MockRemote {
    state: Mutex<MockState>,
}

struct MockState {
    schema: Schema,
    tables: BTreeMap<String, Vec<Record>>,
    versions: BTreeMap<String, i64>,
    floors: BTreeMap<String, i64>,
    tombstones: BTreeMap<String, Vec<Tombstone>>,
    applied: BTreeSet<Uuid>,
    received: Vec<ChangeBatch>,
    refresh_tables: BTreeSet<String>,
    clock_offset_ms: i64,
    stuck_residual_ms: Option<i64>,
    failing_submits: u32,
    failing_reads: u32,
}

impl MockRemote {
    /// A mock server holding the given schema and no data.
    pub fn new(schema: Schema) -> Self {
        MockRemote {
            state: Mutex::new(MockState {
                schema,
                tables: BTreeMap::new(),
                versions: BTreeMap::new(),
                floors: BTreeMap::new(),
                tombstones: BTreeMap::new(),
                applied: BTreeSet::new(),
                received: Vec::new(),
                refresh_tables: BTreeSet::new(),
                clock_offset_ms: 0,
                stuck_residual_ms: None,
                failing_submits: 0,
                failing_reads: 0,
            }),
        }
    }

    /// Seeds a server row, stamping the next table version on it.
    pub fn seed_row(&self, table: &str, record: Record) {
        let mut state = self.state.lock();
        state.upsert_row(table, record);
    }

    /// Records a server-side deletion in the tombstone log.
    pub fn seed_tombstone(&self, table: &str, pk: Vec<Value>) {
        let mut state = self.state.lock();
        let version = state.bump_version(table);
        state.remove_row(table, &pk);
        state
            .tombstones
            .entry(table.to_string())
            .or_default()
            .push(Tombstone {
                table: table.to_string(),
                pk,
                table_version: version,
            });
    }

    /// Replaces the served schema (version bumps drive schema refetch).
    pub fn set_schema(&self, schema: Schema) {
        self.state.lock().schema = schema;
    }

    /// Simulates a constant client-server clock offset.
    pub fn set_clock_offset_ms(&self, offset: i64) {
        self.state.lock().clock_offset_ms = offset;
    }

    /// Makes every time probe return the same residual, so calibration
    /// can never converge.
    pub fn set_stuck_residual_ms(&self, residual: i64) {
        self.state.lock().stuck_residual_ms = Some(residual);
    }

    /// Fails the next `count` submit calls with a retryable transport
    /// error.
    pub fn fail_next_submits(&self, count: u32) {
        self.state.lock().failing_submits = count;
    }

    /// Fails the next `count` read calls with a retryable transport
    /// error.
    pub fn fail_next_reads(&self, count: u32) {
        self.state.lock().failing_reads = count;
    }

    /// Answers `should_refresh` for batches touching this table.
    pub fn mark_should_refresh(&self, table: &str) {
        self.state.lock().refresh_tables.insert(table.to_string());
    }

    /// Sets the force-refresh floor for a table.
    pub fn set_force_refresh_floor(&self, table: &str, floor: i64) {
        self.state.lock().floors.insert(table.to_string(), floor);
    }

    /// Batches applied so far, in arrival order.
    pub fn received_batches(&self) -> Vec<ChangeBatch> {
        self.state.lock().received.clone()
    }

    /// Ids of batches the server has applied (not just acknowledged).
    pub fn applied_batch_ids(&self) -> Vec<Uuid> {
        self.state.lock().applied.iter().copied().collect()
    }

    /// Current rows of a server table.
    pub fn server_rows(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Current version of a server table.
    pub fn server_version(&self, table: &str) -> i64 {
        self.state.lock().versions.get(table).copied().unwrap_or(0)
    }
}

impl MockState {
    fn bump_version(&mut self, table: &str) -> i64 {
        let version = self.versions.entry(table.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    fn row_pk(&self, table: &str, record: &Record) -> Option<Vec<Value>> {
        let schema = self.schema.table(table).ok()?;
        schema.pk_values(record).ok()
    }

    fn upsert_row(&mut self, table: &str, mut record: Record) {
        let version = self.bump_version(table);
        record.insert(TABLE_VERSION.to_string(), Value::from(version));
        let schema = self.schema.table(table).ok().cloned();
        let pk = schema.as_ref().and_then(|s| s.pk_values(&record).ok());
        let rows = self.tables.entry(table.to_string()).or_default();
        if let (Some(schema), Some(pk)) = (schema.as_ref(), pk) {
            if let Some(existing) = rows
                .iter_mut()
                .find(|row| schema.pk_values(row).ok().as_deref() == Some(pk.as_slice()))
            {
                *existing = record;
                return;
            }
        }
        rows.push(record);
    }

    fn remove_row(&mut self, table: &str, pk: &[Value]) {
        let Ok(schema) = self.schema.table(table) else {
            return;
        };
        let schema = schema.clone();
        if let Some(rows) = self.tables.get_mut(table) {
            rows.retain(|row| match schema.pk_values(row) {
                Ok(values) => values != pk,
                Err(_) => true,
            });
        }
    }

    fn apply_entry(&mut self, entry: &ChangeEntry) -> SyncResult<()> {
        match entry {
            ChangeEntry::Insert { table, record }
            | ChangeEntry::Update { table, record }
            | ChangeEntry::Auto { table, record } => {
                self.upsert_row(table, record.clone());
            }
            ChangeEntry::Remove { table, record } => {
                let Some(pk) = self.row_pk(table, record) else {
                    return Err(SyncError::transport_fatal(format!(
                        "removal without a primary key for table {table}"
                    )));
                };
                let version = self.bump_version(table);
                self.remove_row(table, &pk);
                self.tombstones
                    .entry(table.clone())
                    .or_default()
                    .push(Tombstone {
                        table: table.clone(),
                        pk,
                        table_version: version,
                    });
            }
            ChangeEntry::RemoveWhere { table, condition } => {
                let parsed = Condition::parse(condition)
                    .map_err(|err| SyncError::transport_fatal(err.to_string()))?;
                let doomed: Vec<Vec<Value>> = self
                    .tables
                    .get(table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|row| parsed.matches(row))
                            .filter_map(|row| self.row_pk(table, row))
                            .collect()
                    })
                    .unwrap_or_default();
                for pk in doomed {
                    let version = self.bump_version(table);
                    self.remove_row(table, &pk);
                    self.tombstones
                        .entry(table.clone())
                        .or_default()
                        .push(Tombstone {
                            table: table.clone(),
                            pk,
                            table_version: version,
                        });
                }
            }
        }
        Ok(())
    }
}

impl RemoteEndpoint for MockRemote {
    async fn submit_changes(&self, batch: &ChangeBatch) -> SyncResult<SubmitOutcome> {
        let mut state = self.state.lock();
        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(SyncError::transport("injected submit failure"));
        }
        let should_refresh = batch
            .tables()
            .iter()
            .any(|table| state.refresh_tables.contains(*table));
        if state.applied.contains(&batch.id) {
            // Duplicate upload of an already applied batch: acknowledge
            // without reapplying.
            return Ok(SubmitOutcome { should_refresh });
        }
        for entry in &batch.entries {
            state.apply_entry(entry)?;
        }
        state.applied.insert(batch.id);
        state.received.push(batch.clone());
        Ok(SubmitOutcome { should_refresh })
    }

    async fn time_delta(&self, proposed_ms: i64) -> SyncResult<i64> {
        let state = self.state.lock();
        if let Some(residual) = state.stuck_residual_ms {
            return Ok(residual);
        }
        Ok(now_millis() + state.clock_offset_ms - proposed_ms)
    }

    async fn schema_version(&self) -> SyncResult<i64> {
        Ok(self.state.lock().schema.version)
    }

    async fn fetch_schema(&self) -> SyncResult<Schema> {
        Ok(self.state.lock().schema.clone())
    }

    async fn table_versions(&self, tables: &[String]) -> SyncResult<Vec<TableVersion>> {
        let state = self.state.lock();
        Ok(tables
            .iter()
            .map(|table| TableVersion {
                table: table.clone(),
                version: state.versions.get(table).copied().unwrap_or(0),
                force_refresh_floor: state.floors.get(table).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn multiread(&self, reads: &[RemoteRead]) -> SyncResult<RemoteReadResults> {
        let mut state = self.state.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(SyncError::transport("injected read failure"));
        }
        let mut results = RemoteReadResults::default();
        for read in reads {
            let condition = if read.condition.is_null() {
                Condition::always()
            } else {
                Condition::parse(&read.condition)
                    .map_err(|err| SyncError::transport_fatal(err.to_string()))?
            };
            let rows: Vec<Record> = state
                .tables
                .get(&read.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| condition.matches(row))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            results.rows.insert(read.table.clone(), rows);
            if let Some(after) = read.tombstones_after {
                let tombstones: Vec<Tombstone> = state
                    .tombstones
                    .get(&read.table)
                    .map(|log| {
                        log.iter()
                            .filter(|t| t.table_version > after)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                results.tombstones.insert(read.table.clone(), tombstones);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablesync_core::TableSchema;

    fn schema() -> Schema {
        Schema::new(1).with_table(TableSchema::new("user", &["uid"], &["uid", "name"]))
    }

    fn record(v: Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn duplicate_batches_are_acknowledged_once() {
        let remote = MockRemote::new(schema());
        let batch = ChangeBatch::new(vec![ChangeEntry::Insert {
            table: "user".into(),
            record: record(json!({"uid": "u1", "name": "Ada"})),
        }]);
        remote.submit_changes(&batch).await.unwrap();
        remote.submit_changes(&batch).await.unwrap();

        assert_eq!(remote.received_batches().len(), 1);
        assert_eq!(remote.server_rows("user").len(), 1);
        assert_eq!(remote.server_version("user"), 1);
    }

    #[tokio::test]
    async fn removals_leave_tombstones() {
        let remote = MockRemote::new(schema());
        remote.seed_row("user", record(json!({"uid": "u1", "name": "Ada"})));
        let batch = ChangeBatch::new(vec![ChangeEntry::Remove {
            table: "user".into(),
            record: record(json!({"uid": "u1"})),
        }]);
        remote.submit_changes(&batch).await.unwrap();

        assert!(remote.server_rows("user").is_empty());
        let reads = [RemoteRead {
            table: "user".into(),
            condition: Value::Null,
            tombstones_after: Some(0),
        }];
        let results = remote.multiread(&reads).await.unwrap();
        assert_eq!(results.tombstones["user"].len(), 1);
        assert_eq!(results.tombstones["user"][0].pk, vec![json!("u1")]);
    }

    #[tokio::test]
    async fn delta_reads_see_only_newer_rows() {
        let remote = MockRemote::new(schema());
        remote.seed_row("user", record(json!({"uid": "u1", "name": "Ada"})));
        remote.seed_row("user", record(json!({"uid": "u2", "name": "Brad"})));

        let reads = [RemoteRead {
            table: "user".into(),
            condition: json!({"table_version": {"ope": ">", "value": 1}}),
            tombstones_after: None,
        }];
        let results = remote.multiread(&reads).await.unwrap();
        assert_eq!(results.rows["user"].len(), 1);
        assert_eq!(results.rows["user"][0]["uid"], json!("u2"));
    }

    #[tokio::test]
    async fn time_delta_reflects_the_scripted_offset() {
        let remote = MockRemote::new(schema());
        remote.set_clock_offset_ms(120_000);
        let residual = remote.time_delta(now_millis()).await.unwrap();
        assert!((119_000..=121_000).contains(&residual));

        let corrected = remote.time_delta(now_millis() + residual).await.unwrap();
        assert!(corrected.abs() < 500);
    }
}
