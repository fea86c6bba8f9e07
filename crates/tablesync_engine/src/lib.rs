//! Offline sync engine.
//!
//! Keeps a local dataset (behind any [`tablesync_store::StorageEngine`])
//! converging with a server reachable through a [`RemoteEndpoint`]:
//!
//! - local mutations are applied atomically and queued durably, then
//!   uploaded one batch per round trip with a clock-skew stamp;
//! - downloads are per-table version deltas driven by persisted cursors,
//!   with tombstone replay for deletions and forced full refreshes when
//!   the server demands them;
//! - a schema cache keeps the local schema aligned with the server's.
//!
//! One sync cycle runs at a time; concurrent `sync()` calls defer with a
//! fixed-delay retry. All tuning lives in [`SyncConfig`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tablesync_core::Schema;
//! # use tablesync_store::MemoryEngine;
//! # use tablesync_engine::{MockRemote, SyncConfig, SyncEngine};
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryEngine::new());
//! let remote = Arc::new(MockRemote::new(Schema::new(1)));
//! let engine = SyncEngine::new(store, remote, SyncConfig::new("acct"), Schema::new(1))?;
//! let report = engine.sync().await?;
//! println!("downloaded {} rows", report.downloaded_rows);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod meta;
mod orchestrator;
mod queue;
mod remote;
mod schema_cache;
mod state;
mod versions;

pub use clock::calibrate;
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use meta::{
    is_meta_table, with_meta_tables, CHANGE_QUEUE_TABLE, SCHEMA_CACHE_TABLE, TABLE_VERSION_TABLE,
};
pub use orchestrator::SyncEngine;
pub use queue::ChangeQueue;
pub use remote::{
    MockRemote, RemoteEndpoint, RemoteRead, RemoteReadResults, SubmitOutcome, TableVersion,
};
pub use schema_cache::SchemaCache;
pub use state::{SyncReport, SyncState};
pub use versions::VersionTracker;
