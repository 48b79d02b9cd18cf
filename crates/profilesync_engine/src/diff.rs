//! Diff applier: brings remote-side changes into the primary.
//!
//! The remote keeps no changelog, so its changes are found by comparing
//! full snapshots of both tables. Rows only on the remote are inserted,
//! rows on both sides are resolved last-writer-wins, and rows only on the
//! primary are treated as remote deletions.
//!
//! A primary row that was created locally but never pushed is
//! indistinguishable from a remote deletion. The orchestrator therefore
//! always pushes first, [`DiffOptions::tombstone_guard`] can hold back
//! deletions of rows that still have pending change records, and
//! [`DiffOptions::withhold_deletes`] drops the deletion pass altogether
//! for a cycle whose push did not complete.
//!
//! Rows that cannot be decoded on either side are reported as failures and
//! left untouched. Their ids, when readable, still count as present, so an
//! unreadable remote row never turns into a deletion on the primary.

use crate::changelog;
use crate::config::{StoreRole, DEFAULT_SNAPSHOT_WARN_ROWS};
use crate::conflict::{resolve_profiles, Resolution};
use crate::error::SyncResult;
use crate::model::{Profile, UndecodableRow};
use crate::profiles::{self, ProfileEntry};
use crate::report::{ApplyAction, ApplyReport, Direction, RecordOutcome, SkipReason};
use crate::txn;
use profilesync_store::Store;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Tunables for one diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Skip tombstone deletion of primary rows with pending change records.
    pub tombstone_guard: bool,
    /// Snapshot size above which a scaling warning is logged.
    pub snapshot_warn_rows: usize,
    /// Skip the deletion pass entirely.
    pub withhold_deletes: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            tombstone_guard: false,
            snapshot_warn_rows: DEFAULT_SNAPSHOT_WARN_ROWS,
            withhold_deletes: false,
        }
    }
}

/// Diffs the remote snapshot into the primary with default options.
pub fn diff_sync<R: Store, P: Store>(remote: &mut R, primary: &mut P) -> SyncResult<ApplyReport> {
    diff_sync_with(remote, primary, &DiffOptions::default())
}

/// Diffs the remote snapshot into the primary.
///
/// Both snapshots are read before the primary transaction opens. All
/// writes then land in one primary transaction, each record in its own
/// savepoint so a failing row does not take the batch down.
///
/// # Errors
///
/// Querying either snapshot, opening the transaction, or committing it.
pub fn diff_sync_with<R: Store, P: Store>(
    remote: &mut R,
    primary: &mut P,
    options: &DiffOptions,
) -> SyncResult<ApplyReport> {
    info!("Syncing remote -> primary");
    let mut report = ApplyReport::new(Direction::RemoteToPrimary);

    let (remote_rows, remote_bad) = split_entries(profiles::scan_profiles(remote)?);
    let (primary_list, primary_bad) = split_entries(profiles::scan_profiles(primary)?);
    let mut primary_rows: HashMap<String, Profile> = primary_list
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    let remote_total = remote_rows.len() + remote_bad.len();
    let primary_total = primary_rows.len() + primary_bad.len();
    warn_if_large(StoreRole::Remote, remote_total, options.snapshot_warn_rows);
    warn_if_large(StoreRole::Primary, primary_total, options.snapshot_warn_rows);
    debug!(
        remote = remote_total,
        primary = primary_total,
        unreadable = remote_bad.len() + primary_bad.len(),
        "Loaded snapshots"
    );

    // Ids behind unreadable rows: never written, never tombstoned.
    let remote_unreadable: HashSet<String> =
        remote_bad.iter().filter_map(|bad| bad.profile_id.clone()).collect();
    let primary_unreadable: HashSet<String> =
        primary_bad.iter().filter_map(|bad| bad.profile_id.clone()).collect();
    for (role, bad) in primary_bad
        .into_iter()
        .map(|bad| (StoreRole::Primary, bad))
        .chain(remote_bad.into_iter().map(|bad| (StoreRole::Remote, bad)))
    {
        error!(
            store = %role,
            profile_id = ?bad.profile_id,
            error = %bad.error,
            "Cannot read profile row; leaving it alone"
        );
        report.record(
            bad.profile_id.unwrap_or_default(),
            None,
            RecordOutcome::Failed(bad.error),
        );
    }

    let protected = if options.tombstone_guard && !options.withhold_deletes {
        changelog::pending_profile_ids(primary)?
    } else {
        HashSet::new()
    };

    primary.begin()?;

    for remote_row in &remote_rows {
        if primary_unreadable.contains(&remote_row.id) {
            continue;
        }
        let outcome = match primary_rows.remove(&remote_row.id) {
            None => apply(primary, ApplyAction::Inserted, |s| {
                profiles::insert_profile(s, remote_row)
            }),
            Some(primary_row) => match resolve_profiles(&primary_row, remote_row) {
                Resolution::AcceptRemote => apply(primary, ApplyAction::Updated, |s| {
                    profiles::update_profile(s, remote_row).map(drop)
                }),
                Resolution::KeepPrimary => RecordOutcome::Skipped(SkipReason::PrimaryNotOlder),
                Resolution::Undecidable => RecordOutcome::Skipped(SkipReason::MissingTimestamp),
            },
        };
        log_outcome(&remote_row.id, &outcome);
        report.record(&remote_row.id, None, outcome);
    }

    // Whatever is left exists only on the primary.
    let mut orphans: Vec<String> = primary_rows
        .into_keys()
        .filter(|id| !remote_unreadable.contains(id))
        .collect();
    orphans.sort_unstable();
    for id in orphans {
        let outcome = if options.withhold_deletes {
            RecordOutcome::Skipped(SkipReason::DeletionWithheld)
        } else if protected.contains(&id) {
            RecordOutcome::Skipped(SkipReason::PendingLocalChange)
        } else {
            apply(primary, ApplyAction::Deleted, |s| {
                profiles::delete_profile(s, &id).map(drop)
            })
        };
        log_outcome(&id, &outcome);
        report.record(id, None, outcome);
    }

    let applied = report.applied();
    if applied == 0 {
        txn::rollback_quietly(primary, StoreRole::Primary);
        return Ok(report);
    }
    if let Err(e) = txn::commit(primary, StoreRole::Primary) {
        txn::rollback_quietly(primary, StoreRole::Primary);
        return Err(e);
    }

    info!(
        applied,
        inserted = report.applied_with(ApplyAction::Inserted),
        updated = report.applied_with(ApplyAction::Updated),
        deleted = report.applied_with(ApplyAction::Deleted),
        failed = report.failures().count(),
        "Applied remote changes"
    );
    Ok(report)
}

fn apply<P, F>(primary: &mut P, action: ApplyAction, write: F) -> RecordOutcome
where
    P: Store,
    F: FnOnce(&mut P) -> SyncResult<()>,
{
    match txn::in_savepoint(primary, StoreRole::Primary, write) {
        Ok(()) => RecordOutcome::Applied(action),
        Err(e) => RecordOutcome::Failed(e),
    }
}

fn split_entries(entries: Vec<ProfileEntry>) -> (Vec<Profile>, Vec<UndecodableRow>) {
    let mut rows = Vec::with_capacity(entries.len());
    let mut bad = Vec::new();
    for entry in entries {
        match entry {
            Ok(profile) => rows.push(profile),
            Err(undecodable) => bad.push(undecodable),
        }
    }
    (rows, bad)
}

fn warn_if_large(role: StoreRole, rows: usize, threshold: usize) {
    if rows > threshold {
        warn!(
            store = %role,
            rows,
            threshold,
            "Snapshot exceeds the size full-table diffing is meant for"
        );
    }
}

fn log_outcome(profile_id: &str, outcome: &RecordOutcome) {
    match outcome {
        RecordOutcome::Applied(action) => {
            info!(profile_id, %action, "Applied remote change to primary")
        }
        RecordOutcome::Skipped(reason) => debug!(profile_id, %reason, "Kept primary row"),
        RecordOutcome::Failed(e) => {
            error!(profile_id, error = %e, "Failed to apply remote change")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ensure_primary_schema, ensure_schema};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use profilesync_store::{Endpoint, SqlValue, SqliteStore};

    fn t(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn stores() -> (SqliteStore, SqliteStore) {
        let mut primary = SqliteStore::open(&Endpoint::Memory).unwrap();
        ensure_primary_schema(&mut primary).unwrap();
        let mut remote = SqliteStore::open(&Endpoint::Memory).unwrap();
        ensure_schema(&mut remote).unwrap();
        (primary, remote)
    }

    fn profile(id: &str, email: &str, at: i64) -> Profile {
        Profile::new(id).with_email(email).with_updated_at(t(at))
    }

    #[test]
    fn remote_only_row_is_inserted() {
        let (mut primary, mut remote) = stores();
        profiles::insert_profile(&mut remote, &profile("p1", "a@x.com", 0)).unwrap();

        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert_eq!(report.applied_with(ApplyAction::Inserted), 1);
        assert_eq!(
            profiles::find_profile(&mut primary, "p1").unwrap(),
            Some(profile("p1", "a@x.com", 0))
        );
    }

    #[test]
    fn newer_remote_overwrites_and_older_is_kept() {
        let (mut primary, mut remote) = stores();
        profiles::insert_profile(&mut primary, &profile("new", "old@x.com", 0)).unwrap();
        profiles::insert_profile(&mut remote, &profile("new", "new@x.com", 5)).unwrap();
        profiles::insert_profile(&mut primary, &profile("old", "keep@x.com", 5)).unwrap();
        profiles::insert_profile(&mut remote, &profile("old", "stale@x.com", 0)).unwrap();
        profiles::insert_profile(&mut primary, &profile("tie", "mine@x.com", 3)).unwrap();
        profiles::insert_profile(&mut remote, &profile("tie", "theirs@x.com", 3)).unwrap();

        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert_eq!(report.applied(), 1);
        assert!(matches!(
            report.outcome_for("old"),
            Some(RecordOutcome::Skipped(SkipReason::PrimaryNotOlder))
        ));
        assert!(matches!(
            report.outcome_for("tie"),
            Some(RecordOutcome::Skipped(SkipReason::PrimaryNotOlder))
        ));

        let email = |p: &mut SqliteStore, id: &str| profiles::find_profile(p, id).unwrap().unwrap().email;
        assert_eq!(email(&mut primary, "new").as_deref(), Some("new@x.com"));
        assert_eq!(email(&mut primary, "old").as_deref(), Some("keep@x.com"));
        assert_eq!(email(&mut primary, "tie").as_deref(), Some("mine@x.com"));
    }

    #[test]
    fn missing_timestamp_is_never_overwritten() {
        let (mut primary, mut remote) = stores();
        profiles::insert_profile(&mut primary, &Profile::new("p1").with_email("a@x.com")).unwrap();
        profiles::insert_profile(&mut remote, &profile("p1", "b@x.com", 9)).unwrap();

        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert!(matches!(
            report.outcome_for("p1"),
            Some(RecordOutcome::Skipped(SkipReason::MissingTimestamp))
        ));
        assert!(!primary.in_transaction());
    }

    #[test]
    fn primary_only_rows_are_deleted_unless_guarded() {
        let (mut primary, mut remote) = stores();
        profiles::insert_profile(&mut primary, &profile("gone", "g@x.com", 0)).unwrap();
        profiles::insert_profile(&mut primary, &profile("fresh", "f@x.com", 0)).unwrap();
        primary
            .execute(
                "INSERT INTO change_log (profile_id, operation, occurred_at) VALUES (?1, 'INSERT', ?2)",
                &[SqlValue::text("fresh"), SqlValue::text("2024-01-01T10:00:00Z")],
            )
            .unwrap();

        let options = DiffOptions {
            tombstone_guard: true,
            ..DiffOptions::default()
        };
        let report = diff_sync_with(&mut remote, &mut primary, &options).unwrap();
        assert_eq!(report.applied_with(ApplyAction::Deleted), 1);
        assert!(matches!(
            report.outcome_for("fresh"),
            Some(RecordOutcome::Skipped(SkipReason::PendingLocalChange))
        ));
        assert!(!profiles::profile_exists(&mut primary, "gone").unwrap());
        assert!(profiles::profile_exists(&mut primary, "fresh").unwrap());

        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert_eq!(report.applied_with(ApplyAction::Deleted), 1);
        assert_eq!(profiles::count_profiles(&mut primary).unwrap(), 0);
    }

    #[test]
    fn withheld_deletes_keep_primary_only_rows() {
        let (mut primary, mut remote) = stores();
        profiles::insert_profile(&mut primary, &profile("local", "l@x.com", 0)).unwrap();
        profiles::insert_profile(&mut remote, &profile("theirs", "t@x.com", 0)).unwrap();

        let options = DiffOptions {
            withhold_deletes: true,
            ..DiffOptions::default()
        };
        let report = diff_sync_with(&mut remote, &mut primary, &options).unwrap();
        assert_eq!(report.applied_with(ApplyAction::Inserted), 1);
        assert!(matches!(
            report.outcome_for("local"),
            Some(RecordOutcome::Skipped(SkipReason::DeletionWithheld))
        ));
        assert_eq!(profiles::count_profiles(&mut primary).unwrap(), 2);
    }

    #[test]
    fn unreadable_remote_row_is_not_a_deletion() {
        let (mut primary, mut remote) = stores();
        profiles::insert_profile(&mut primary, &profile("p1", "a@x.com", 0)).unwrap();
        remote
            .execute(
                "INSERT INTO profiles (id, email, updated_at) VALUES ('p1', X'00FF', '2024-01-01T10:00:09Z')",
                &[],
            )
            .unwrap();

        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert_eq!(report.applied(), 0);
        assert!(report.outcome_for("p1").unwrap().is_failed());
        assert_eq!(
            profiles::find_profile(&mut primary, "p1").unwrap(),
            Some(profile("p1", "a@x.com", 0))
        );
    }

    #[test]
    fn unreadable_primary_row_is_left_alone() {
        let (mut primary, mut remote) = stores();
        primary
            .execute(
                "INSERT INTO profiles (id, email, updated_at) VALUES ('p1', X'00FF', '2024-01-01T10:00:00Z')",
                &[],
            )
            .unwrap();
        profiles::insert_profile(&mut remote, &profile("p1", "b@x.com", 9)).unwrap();
        profiles::insert_profile(&mut remote, &profile("p2", "c@x.com", 0)).unwrap();

        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert_eq!(report.applied(), 1);
        assert_eq!(report.failures().count(), 1);
        assert!(report.outcome_for("p1").unwrap().is_failed());
        assert!(profiles::profile_exists(&mut primary, "p2").unwrap());
    }

    #[test]
    fn identical_tables_write_nothing() {
        let (mut primary, mut remote) = stores();
        for id in ["a", "b"] {
            profiles::insert_profile(&mut primary, &profile(id, "x@x.com", 1)).unwrap();
            profiles::insert_profile(&mut remote, &profile(id, "x@x.com", 1)).unwrap();
        }
        let report = diff_sync(&mut remote, &mut primary).unwrap();
        assert_eq!(report.applied(), 0);
        assert_eq!(report.skipped().count(), 2);
    }
}
