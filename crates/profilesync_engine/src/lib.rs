//! # profilesync engine
//!
//! Keeps a profile table in two independently writable stores, a
//! **primary** and a **remote replica**, eventually consistent without a
//! coordinator.
//!
//! This crate provides:
//! - Schema provisioning for both stores
//! - A changelog reader for the primary's `change_log` table
//! - The push applier (primary → remote, driven by the changelog)
//! - The diff applier (remote → primary, driven by a full-table comparison)
//! - Last-writer-wins conflict resolution by `updated_at`
//! - A cycle orchestrator that sequences provision → push → diff
//!
//! ## Architecture
//!
//! A cycle is **push-then-diff**:
//! 1. Ensure the remote `profiles` table exists
//! 2. Replay every unsynchronized change record onto the remote
//! 3. Compare full snapshots and bring remote-side changes into the primary
//!
//! Push runs first so the diff never undoes a local write that has not
//! reached the remote yet.
//!
//! ## Key Invariants
//!
//! - A change record is marked synchronized only together with its remote apply
//! - Replaying a change record is idempotent (upsert, delete-if-present)
//! - Ties on `updated_at` keep the primary row
//! - One bad record never aborts the rest of its batch
//! - A cycle never returns an error; failures are reported per stage
//!
//! ## Scaling
//!
//! The diff loads both tables in full every cycle, which is O(n) in the
//! table size. It is meant for tables in the thousands-of-rows range;
//! [`SyncConfig::snapshot_warn_rows`] logs a warning when a snapshot grows
//! past that assumption.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod changelog;
mod config;
pub mod conflict;
pub mod diff;
mod error;
mod model;
mod orchestrator;
pub mod profiles;
pub mod push;
mod report;
pub mod schema;
mod txn;

pub use config::{
    StoreRole, SyncConfig, DEFAULT_SNAPSHOT_WARN_ROWS, PRIMARY_ENDPOINT_VAR, REMOTE_ENDPOINT_VAR,
};
pub use diff::{diff_sync, diff_sync_with, DiffOptions};
pub use error::{ConfigError, SyncError, SyncResult};
pub use model::{
    format_timestamp, parse_timestamp, ChangeOperation, ChangeRecord, Profile, Timestamp,
    UndecodableRow,
};
pub use orchestrator::{
    CycleReport, Stage, StageOutcome, SyncOrchestrator, SyncState, SyncStats, SyncStatus,
};
pub use push::push;
pub use report::{ApplyAction, ApplyReport, Direction, RecordOutcome, RecordReport, SkipReason};
pub use schema::{ensure_primary_schema, ensure_schema};

pub use profilesync_store::{Connector, Endpoint, SqliteConnector, SqliteStore, Store};
