//! # tablesync core
//!
//! Shared data model for the tablesync offline replication client.
//!
//! This crate provides:
//! - Records as JSON column maps with engine-owned revision fields
//! - Table schemas (primary keys, column kinds, foreign keys, view composition)
//! - Change entries and atomic change batches
//! - Tombstones for replicated deletions
//!
//! ## Key Invariants
//!
//! - Primary keys are immutable after insert
//! - The per-record revision counter advances by exactly one per update
//! - Change batches preserve entry order across serialization
//! - Batch ids are random, never content-derived

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod record;
mod schema;
mod time;

pub use change::{ChangeBatch, ChangeEntry, Tombstone};
pub use error::{CoreError, CoreResult};
pub use record::{
    record_value, revision_of, stamp_insert, stamp_update, Record, ROW_MODIFIED, ROW_VERSION,
    TABLE_VERSION,
};
pub use schema::{ColumnDef, ColumnKind, ForeignKey, Schema, TableSchema, ViewSource};
pub use time::now_millis;
