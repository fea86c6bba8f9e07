//! Binary attachment reconciliation for tablesync clients.
//!
//! Attachments are content-addressed by SHA-256 digest. Each client keeps
//! three facts per attachment: the local payload digest, the digest both
//! sides last agreed on, and the server's canonical digest. Comparing the
//! three yields one of four outcomes: skip, upload, download, or a
//! conflict handed to a [`ConflictResolver`].
//!
//! ```no_run
//! use tablesync_binary::{BinaryReconciler, BinaryRecord, BinaryStore, MemoryBinaryStore, MockBinaryEndpoint};
//!
//! # async fn demo() -> tablesync_binary::BinaryResult<()> {
//! let store = MemoryBinaryStore::new();
//! store.prepare("acct-7")?;
//! let sync = BinaryReconciler::new(store, MockBinaryEndpoint::new());
//!
//! let record = BinaryRecord::new("b1", "report", "r1", "scan.pdf", "application/pdf");
//! sync.store().save_binary(&record, b"...pdf bytes...")?;
//! let report = sync.reconcile_all().await?;
//! assert_eq!(report.failures.len(), 0);
//! # Ok(())
//! # }
//! ```

mod decision;
mod error;
mod reconciler;
mod record;
mod remote;
mod resolver;
mod store;
mod watcher;

pub use decision::{decide, Decision};
pub use error::{BinaryError, BinaryResult};
pub use reconciler::{BinaryReconciler, ReconcileReport};
pub use record::{checksum_hex, BinaryRecord, LastSyncRecord, LocalFileInfo};
pub use remote::{BinaryEndpoint, MockBinaryEndpoint, TransferLog};
pub use resolver::{ConflictResolver, KeepLocalResolver, ResolvedAction};
pub use store::{BinaryStore, MemoryBinaryStore};
pub use watcher::FileWatchDebouncer;
