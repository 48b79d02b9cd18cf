//! Transaction helpers shared by the appliers.

use crate::config::StoreRole;
use crate::error::{SyncError, SyncResult};
use profilesync_store::Store;
use tracing::warn;

/// Savepoint wrapping a single record's writes.
pub(crate) const RECORD_SAVEPOINT: &str = "profilesync_record";

/// Runs `f` inside a record savepoint on one store.
///
/// On error the savepoint is rolled back, leaving the surrounding
/// transaction as it was before the record.
pub(crate) fn in_savepoint<S, T, F>(store: &mut S, role: StoreRole, f: F) -> SyncResult<T>
where
    S: Store,
    F: FnOnce(&mut S) -> SyncResult<T>,
{
    store.savepoint(RECORD_SAVEPOINT)?;
    match f(store).and_then(|value| {
        store.release(RECORD_SAVEPOINT)?;
        Ok(value)
    }) {
        Ok(value) => Ok(value),
        Err(e) => {
            undo_savepoint(store, role);
            Err(e)
        }
    }
}

/// Rolls back to the record savepoint, logging instead of failing.
pub(crate) fn undo_savepoint<S: Store>(store: &mut S, role: StoreRole) {
    if let Err(e) = store.rollback_to(RECORD_SAVEPOINT) {
        warn!(store = %role, error = %e, "Failed to roll back record savepoint");
    }
}

/// Rolls back the open transaction, logging instead of failing.
pub(crate) fn rollback_quietly<S: Store>(store: &mut S, role: StoreRole) {
    if let Err(e) = store.rollback() {
        warn!(store = %role, error = %e, "Rollback failed");
    }
}

/// Commits, tagging a failure with the store role.
pub(crate) fn commit<S: Store>(store: &mut S, role: StoreRole) -> SyncResult<()> {
    store
        .commit()
        .map_err(|source| SyncError::Commit { store: role, source })
}
