//! Changelog reader for the primary store.
//!
//! Rows are appended to `change_log` by the primary's write path (triggers
//! or application code). This module only reads them and flips their
//! `synchronized` flag.

use crate::error::{SyncError, SyncResult};
use crate::model::{ChangeRecord, UndecodableRow};
use profilesync_store::{SqlValue, Store};
use std::collections::HashSet;
use tracing::{debug, warn};

const CHANGE_COLUMNS: &str = "id, profile_id, operation, display_name, username, email, account_type, avatar_url, created_at, updated_at, owner_user_id, occurred_at, synchronized";

/// One unsynchronized `change_log` row, decoded or not.
pub type PendingEntry = Result<ChangeRecord, UndecodableRow>;

/// Reads every unsynchronized change record, oldest first.
///
/// Records sharing an `occurred_at` keep their insertion order, so two
/// mutations of the same profile within one clock tick replay in order.
/// Each row is decoded on its own; a row that cannot be read is returned
/// as an [`UndecodableRow`] in its place.
///
/// # Errors
///
/// Only a failure of the query itself.
pub fn scan_pending<S: Store>(primary: &mut S) -> SyncResult<Vec<PendingEntry>> {
    let sql = format!(
        "SELECT {CHANGE_COLUMNS} FROM change_log WHERE synchronized = 0 ORDER BY occurred_at ASC, id ASC"
    );
    let entries: Vec<_> = primary
        .query(&sql, &[])?
        .iter()
        .map(|row| {
            ChangeRecord::from_row(row).map_err(|error| UndecodableRow {
                change_id: row.integer("id").ok(),
                profile_id: row.text("profile_id").ok(),
                error,
            })
        })
        .collect();
    debug!(count = entries.len(), "Read pending change records");
    Ok(entries)
}

/// Like [`scan_pending`], dropping rows that cannot be decoded.
pub fn read_pending<S: Store>(primary: &mut S) -> SyncResult<Vec<ChangeRecord>> {
    let records = scan_pending(primary)?
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(record) => Some(record),
            Err(bad) => {
                warn!(change_id = ?bad.change_id, error = %bad.error, "Undecodable change record");
                None
            }
        })
        .collect();
    Ok(records)
}

/// Reads a single change record by id.
pub fn find_change<S: Store>(primary: &mut S, change_id: i64) -> SyncResult<Option<ChangeRecord>> {
    let sql = format!("SELECT {CHANGE_COLUMNS} FROM change_log WHERE id = ?1");
    match primary.query(&sql, &[SqlValue::Integer(change_id)])?.first() {
        Some(row) => Ok(Some(ChangeRecord::from_row(row)?)),
        None => Ok(None),
    }
}

/// Marks one change record synchronized.
///
/// # Errors
///
/// Returns [`SyncError::InvalidRecord`] if no such record exists.
pub fn mark_synchronized<S: Store>(primary: &mut S, change_id: i64) -> SyncResult<()> {
    let updated = primary.execute(
        "UPDATE change_log SET synchronized = 1 WHERE id = ?1",
        &[SqlValue::Integer(change_id)],
    )?;
    if updated == 0 {
        return Err(SyncError::InvalidRecord(format!(
            "change record {change_id} not found"
        )));
    }
    Ok(())
}

/// Counts unsynchronized change records.
pub fn pending_count<S: Store>(primary: &mut S) -> SyncResult<u64> {
    let rows = primary.query(
        "SELECT COUNT(*) AS n FROM change_log WHERE synchronized = 0",
        &[],
    )?;
    let n = rows.first().map(|r| r.integer("n")).transpose()?.unwrap_or(0);
    Ok(u64::try_from(n).unwrap_or(0))
}

/// Profile ids that still have unsynchronized change records.
pub fn pending_profile_ids<S: Store>(primary: &mut S) -> SyncResult<HashSet<String>> {
    let rows = primary.query(
        "SELECT DISTINCT profile_id FROM change_log WHERE synchronized = 0",
        &[],
    )?;
    Ok(rows
        .iter()
        .filter_map(|row| row.text("profile_id").ok())
        .collect())
}
