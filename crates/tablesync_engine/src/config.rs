//! Sync engine configuration.

use crate::meta::is_meta_table;
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration of a [`crate::SyncEngine`].
///
/// All tuning lives here; nothing is read from global state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Namespace isolating this account's local data.
    pub namespace: String,
    /// Residual clock delta accepted as calibrated, in milliseconds.
    pub clock_tolerance_ms: i64,
    /// Calibration rounds before giving up with a clock-skew error.
    pub clock_max_rounds: u32,
    /// Fixed delay between attempts to start while a cycle runs.
    pub busy_retry_delay: Duration,
    /// Attempts before a busy engine rejects the request.
    pub busy_max_retries: u32,
    /// Tables opted out of offline handling; never uploaded or fetched.
    pub excluded_tables: BTreeSet<String>,
}

impl SyncConfig {
    /// Defaults for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        SyncConfig {
            namespace: namespace.into(),
            clock_tolerance_ms: 500,
            clock_max_rounds: 10,
            busy_retry_delay: Duration::from_millis(200),
            busy_max_retries: 25,
            excluded_tables: BTreeSet::new(),
        }
    }

    /// Sets the calibration tolerance, builder style.
    pub fn with_clock_tolerance_ms(mut self, tolerance: i64) -> Self {
        self.clock_tolerance_ms = tolerance;
        self
    }

    /// Sets the calibration round budget, builder style.
    pub fn with_clock_max_rounds(mut self, rounds: u32) -> Self {
        self.clock_max_rounds = rounds;
        self
    }

    /// Sets the busy deferral delay, builder style.
    pub fn with_busy_retry_delay(mut self, delay: Duration) -> Self {
        self.busy_retry_delay = delay;
        self
    }

    /// Sets the busy deferral budget, builder style.
    pub fn with_busy_max_retries(mut self, retries: u32) -> Self {
        self.busy_max_retries = retries;
        self
    }

    /// Opts a table out of offline handling, builder style.
    pub fn with_excluded_table(mut self, table: impl Into<String>) -> Self {
        self.excluded_tables.insert(table.into());
        self
    }

    /// Whether a table takes part in sync cycles.
    pub fn is_sync_eligible(&self, table: &str) -> bool {
        !is_meta_table(table) && !self.excluded_tables.contains(table)
    }
}
