//! Observable sync cycle state and the cycle report.

use std::fmt;

/// Phase of the sync cycle.
///
/// One cycle runs the active phases in order and always returns to
/// [`SyncState::Idle`], whether it completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle running.
    Idle,
    /// Draining the local change queue to the server.
    Uploading,
    /// Converging on a clock-skew estimate.
    ClockCalibrating,
    /// Comparing local and server schema versions.
    SchemaChecking,
    /// Fetching deltas and tombstones.
    Downloading,
    /// Applying the downloaded batch locally.
    Applying,
}

impl SyncState {
    /// Whether a new cycle may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }

    /// Whether a cycle is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Uploading => "uploading",
            SyncState::ClockCalibrating => "clock-calibrating",
            SyncState::SchemaChecking => "schema-checking",
            SyncState::Downloading => "downloading",
            SyncState::Applying => "applying",
        };
        f.write_str(name)
    }
}

/// Outcome of one completed sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Change batches acknowledged by the server.
    pub uploaded_batches: usize,
    /// Rows inserted or updated from server deltas.
    pub downloaded_rows: usize,
    /// Rows removed by tombstone replay.
    pub removed_rows: usize,
    /// Tables whose cursor moved this cycle.
    pub tables_synced: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_can_start() {
        assert!(SyncState::Idle.can_start_sync());
        for state in [
            SyncState::Uploading,
            SyncState::ClockCalibrating,
            SyncState::SchemaChecking,
            SyncState::Downloading,
            SyncState::Applying,
        ] {
            assert!(!state.can_start_sync());
            assert!(state.is_active());
        }
    }
}
