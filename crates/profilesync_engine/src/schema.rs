//! Schema provisioning.
//!
//! Both calls are idempotent (`CREATE ... IF NOT EXISTS`) and safe to run
//! at the start of every cycle. Neither migrates an existing table.

use crate::error::SyncResult;
use profilesync_store::Store;
use tracing::{debug, info};

/// `profiles` table, present on both stores.
pub const PROFILES_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    display_name TEXT,
    username TEXT,
    email TEXT,
    account_type TEXT,
    avatar_url TEXT,
    created_at TEXT,
    updated_at TEXT,
    owner_user_id TEXT
)";

/// `change_log` table, primary only.
pub const CHANGE_LOG_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS change_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    display_name TEXT,
    username TEXT,
    email TEXT,
    account_type TEXT,
    avatar_url TEXT,
    created_at TEXT,
    updated_at TEXT,
    owner_user_id TEXT,
    occurred_at TEXT NOT NULL,
    synchronized INTEGER NOT NULL DEFAULT 0
)";

/// Index backing the pending-record scan.
pub const CHANGE_LOG_PENDING_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_change_log_pending ON change_log (synchronized, occurred_at, id)";

/// Ensures the `profiles` table exists on the remote store.
///
/// # Errors
///
/// Any store error is returned after the provisioning transaction has been
/// rolled back. The orchestrator aborts the cycle on error.
pub fn ensure_schema<S: Store>(store: &mut S) -> SyncResult<()> {
    info!("Ensuring remote schema");
    in_transaction(store, &[PROFILES_TABLE_SQL])?;
    debug!("Remote schema verified");
    Ok(())
}

/// Ensures `profiles` and `change_log` exist on the primary store.
///
/// Changelog triggers are not installed here; they belong to whatever owns
/// the primary's write path.
pub fn ensure_primary_schema<S: Store>(store: &mut S) -> SyncResult<()> {
    info!("Ensuring primary schema");
    in_transaction(
        store,
        &[
            PROFILES_TABLE_SQL,
            CHANGE_LOG_TABLE_SQL,
            CHANGE_LOG_PENDING_INDEX_SQL,
        ],
    )?;
    debug!("Primary schema verified");
    Ok(())
}

fn in_transaction<S: Store>(store: &mut S, statements: &[&str]) -> SyncResult<()> {
    store.begin()?;
    for sql in statements {
        if let Err(e) = store.execute(sql, &[]) {
            let _ = store.rollback();
            return Err(e.into());
        }
    }
    if let Err(e) = store.commit() {
        let _ = store.rollback();
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use profilesync_store::{Endpoint, SqliteStore};

    fn tables(store: &mut SqliteStore) -> Vec<String> {
        store
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .unwrap()
            .iter()
            .map(|r| r.text("name").unwrap())
            .collect()
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let mut store = SqliteStore::open(&Endpoint::Memory).unwrap();
        ensure_schema(&mut store).unwrap();
        ensure_schema(&mut store).unwrap();
        assert_eq!(tables(&mut store), vec!["profiles"]);
        assert!(!store.in_transaction());
    }

    #[test]
    fn primary_schema_adds_change_log() {
        let mut store = SqliteStore::open(&Endpoint::Memory).unwrap();
        ensure_primary_schema(&mut store).unwrap();
        ensure_primary_schema(&mut store).unwrap();
        assert_eq!(tables(&mut store), vec!["change_log", "profiles"]);
    }

    #[test]
    fn provisioning_keeps_existing_rows() {
        let mut store = SqliteStore::open(&Endpoint::Memory).unwrap();
        ensure_schema(&mut store).unwrap();
        store
            .execute("INSERT INTO profiles (id) VALUES ('p1')", &[])
            .unwrap();
        ensure_schema(&mut store).unwrap();
        let rows = store.query("SELECT id FROM profiles", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
