//! Test fixtures: a primary/remote store pair and changelog helpers.
//!
//! Stores are file-backed SQLite databases in a temporary directory, so
//! every connection the orchestrator opens sees the same data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use profilesync_engine::{
    ensure_primary_schema, ensure_schema, format_timestamp, ChangeOperation, Profile, SyncConfig,
    SyncOrchestrator, Timestamp,
};
use profilesync_store::{Endpoint, SqlValue, SqliteStore, Store, StoreResult};
use tempfile::TempDir;

/// Trigger statements that append to `change_log` on every `profiles` write.
///
/// They stand in for the primary's application write path. `occurred_at`
/// uses millisecond RFC 3339 so text order is time order.
pub const CHANGELOG_TRIGGERS: [&str; 3] = [
    "CREATE TRIGGER IF NOT EXISTS profiles_log_insert AFTER INSERT ON profiles
     BEGIN
        INSERT INTO change_log (profile_id, operation, display_name, username, email, account_type,
                                avatar_url, created_at, updated_at, owner_user_id, occurred_at)
        VALUES (NEW.id, 'INSERT', NEW.display_name, NEW.username, NEW.email, NEW.account_type,
                NEW.avatar_url, NEW.created_at, NEW.updated_at, NEW.owner_user_id,
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
     END",
    "CREATE TRIGGER IF NOT EXISTS profiles_log_update AFTER UPDATE ON profiles
     BEGIN
        INSERT INTO change_log (profile_id, operation, display_name, username, email, account_type,
                                avatar_url, created_at, updated_at, owner_user_id, occurred_at)
        VALUES (NEW.id, 'UPDATE', NEW.display_name, NEW.username, NEW.email, NEW.account_type,
                NEW.avatar_url, NEW.created_at, NEW.updated_at, NEW.owner_user_id,
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
     END",
    "CREATE TRIGGER IF NOT EXISTS profiles_log_delete AFTER DELETE ON profiles
     BEGIN
        INSERT INTO change_log (profile_id, operation, display_name, username, email, account_type,
                                avatar_url, created_at, updated_at, owner_user_id, occurred_at)
        VALUES (OLD.id, 'DELETE', OLD.display_name, OLD.username, OLD.email, OLD.account_type,
                OLD.avatar_url, OLD.created_at, OLD.updated_at, OLD.owner_user_id,
                strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
     END",
];

/// Installs [`CHANGELOG_TRIGGERS`] on a primary store.
///
/// The `profiles` and `change_log` tables must already exist.
pub fn install_changelog_triggers<S: Store>(store: &mut S) -> StoreResult<()> {
    for sql in CHANGELOG_TRIGGERS {
        store.execute(sql, &[])?;
    }
    Ok(())
}

/// Appends a change record by hand and returns its id.
pub fn append_change<S: Store>(
    store: &mut S,
    operation: ChangeOperation,
    snapshot: &Profile,
    occurred_at: DateTime<Utc>,
) -> StoreResult<i64> {
    store.execute(
        "INSERT INTO change_log (profile_id, operation, display_name, username, email, account_type,
                                 avatar_url, created_at, updated_at, owner_user_id, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        &[
            SqlValue::text(&snapshot.id),
            SqlValue::text(operation.as_str()),
            SqlValue::opt_text(snapshot.display_name.as_deref()),
            SqlValue::opt_text(snapshot.username.as_deref()),
            SqlValue::opt_text(snapshot.email.as_deref()),
            SqlValue::opt_text(snapshot.account_type.as_deref()),
            SqlValue::opt_text(snapshot.avatar_url.as_deref()),
            SqlValue::opt_text(snapshot.created_at.as_ref().map(Timestamp::as_str)),
            SqlValue::opt_text(snapshot.updated_at.as_ref().map(Timestamp::as_str)),
            SqlValue::opt_text(snapshot.owner_user_id.as_deref()),
            SqlValue::text(format_timestamp(occurred_at)),
        ],
    )?;
    let rows = store.query("SELECT MAX(id) AS id FROM change_log", &[])?;
    match rows.first() {
        Some(row) => row.integer("id"),
        None => Ok(0),
    }
}

/// A fixed base instant, 2024-01-01T10:00:00Z.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// [`base_time`] shifted by `offset_secs`.
pub fn ts(offset_secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(offset_secs)
}

/// A fully populated profile modified at `ts(updated_offset)`.
pub fn sample_profile(id: &str, updated_offset: i64) -> Profile {
    let mut profile = Profile::new(id)
        .with_email(format!("{id}@example.com"))
        .with_username(id)
        .with_created_at(base_time())
        .with_updated_at(ts(updated_offset));
    profile.display_name = Some(format!("Profile {id}"));
    profile.account_type = Some("standard".to_string());
    profile
}

/// A primary/remote pair of SQLite stores with automatic cleanup.
pub struct TestPair {
    /// Primary store endpoint.
    pub primary: Endpoint,
    /// Remote store endpoint.
    pub remote: Endpoint,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestPair {
    /// Creates a provisioned pair: `profiles` + `change_log` + triggers on
    /// the primary, `profiles` on the remote.
    pub fn new() -> Self {
        let pair = Self::untracked();
        install_changelog_triggers(&mut pair.open_primary()).expect("Failed to install triggers");
        pair
    }

    /// Creates a provisioned pair without changelog triggers, so primary
    /// writes made by the test are not recorded.
    pub fn untracked() -> Self {
        let pair = Self::bare();
        ensure_primary_schema(&mut pair.open_primary()).expect("Failed to provision primary");
        ensure_schema(&mut pair.open_remote()).expect("Failed to provision remote");
        pair
    }

    /// Creates a pair of empty databases with no tables.
    pub fn bare() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            primary: Endpoint::sqlite(temp_dir.path().join("primary.db")),
            remote: Endpoint::sqlite(temp_dir.path().join("remote.db")),
            _temp_dir: temp_dir,
        }
    }

    /// Opens a connection to the primary.
    pub fn open_primary(&self) -> SqliteStore {
        SqliteStore::open(&self.primary).expect("Failed to open primary")
    }

    /// Opens a connection to the remote.
    pub fn open_remote(&self) -> SqliteStore {
        SqliteStore::open(&self.remote).expect("Failed to open remote")
    }

    /// Configuration pointing at this pair.
    pub fn config(&self) -> SyncConfig {
        SyncConfig::new(self.primary.clone(), self.remote.clone())
    }

    /// An orchestrator over this pair with default settings.
    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::sqlite(self.config())
    }

    /// Every primary profile, ordered by id.
    pub fn primary_profiles(&self) -> Vec<Profile> {
        profilesync_engine::profiles::load_profiles(&mut self.open_primary())
            .expect("Failed to load primary profiles")
    }

    /// Every remote profile, ordered by id.
    pub fn remote_profiles(&self) -> Vec<Profile> {
        profilesync_engine::profiles::load_profiles(&mut self.open_remote())
            .expect("Failed to load remote profiles")
    }

    /// Unsynchronized change records on the primary.
    pub fn pending_changes(&self) -> u64 {
        profilesync_engine::changelog::pending_count(&mut self.open_primary())
            .expect("Failed to count pending changes")
    }
}

impl Default for TestPair {
    fn default() -> Self {
        Self::new()
    }
}
