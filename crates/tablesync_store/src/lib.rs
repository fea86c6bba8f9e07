//! # tablesync store
//!
//! The relational query surface of tablesync and the contract local
//! storage backends must satisfy.
//!
//! This crate provides:
//! - Predicate evaluation over declarative condition trees
//! - Order-by parsing and stable multi-column sorting
//! - Join resolution with foreign-key inference
//! - The [`StorageEngine`] contract (CRUD, search, multiread,
//!   transactional batch apply)
//! - [`MemoryEngine`], an in-memory reference implementation
//!
//! Concrete embedded backends (browser structured storage, document
//! stores, filesystem stores) live outside this workspace; they implement
//! [`StorageEngine`] once instead of re-deriving predicate, join and
//! pagination logic per backend.
//!
//! ## Key Invariants
//!
//! - `transactional_changes` is all-or-nothing and isolated: concurrent
//!   readers observe pre- or post-batch state, never partial batches
//! - A requested ordering is never silently dropped
//! - Validation errors fail fast and are never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod condition;
mod engine;
mod error;
mod join;
mod memory;
mod order;

pub use condition::{CompareOp, Condition, Matcher};
pub use engine::{
    pk_condition, PrepareOptions, QueryOptions, ReadOp, ReadResult, ReadSpec, RecordFetcher,
    StorageEngine,
};
pub use error::{StoreError, StoreResult};
pub use join::{resolve_joins, JoinKind, JoinSpec};
pub use memory::MemoryEngine;
pub use order::OrderBy;
