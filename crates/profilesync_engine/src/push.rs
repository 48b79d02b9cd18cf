//! Push applier: replays the primary's changelog onto the remote.
//!
//! Each pending change record is applied inside a savepoint on both stores:
//! the remote write and the `synchronized` flip on the primary either both
//! land in their transactions or neither does. A failed record is rolled
//! back on its own and stays pending for the next cycle.
//!
//! Both transactions commit once at the end, remote first. If the process
//! dies between the two commits, the already-applied records are replayed
//! next cycle. Replay is safe because inserts and updates both become an
//! upsert and deletes tolerate a missing row.

use crate::changelog;
use crate::config::StoreRole;
use crate::error::{SyncError, SyncResult};
use crate::model::{ChangeOperation, ChangeRecord, Profile};
use crate::profiles;
use crate::report::{ApplyAction, ApplyReport, Direction, RecordOutcome, SkipReason};
use crate::txn::{self, RECORD_SAVEPOINT};
use profilesync_store::Store;
use tracing::{debug, error, info, warn};

/// Pushes every pending change record from `primary` to `remote`.
///
/// # Errors
///
/// Only stage-level failures are returned: querying the changelog, opening
/// either transaction, or committing. Per-record failures, including change
/// records that cannot be decoded, are reported in the returned
/// [`ApplyReport`] and stay pending.
pub fn push<P: Store, R: Store>(primary: &mut P, remote: &mut R) -> SyncResult<ApplyReport> {
    info!("Syncing primary -> remote");
    let mut report = ApplyReport::new(Direction::PrimaryToRemote);

    let pending = changelog::scan_pending(primary)?;
    if pending.is_empty() {
        info!("No pending changes");
        return Ok(report);
    }
    info!(count = pending.len(), "Found pending change records");

    let mut records = Vec::with_capacity(pending.len());
    for entry in pending {
        match entry {
            Ok(record) => records.push(record),
            Err(bad) => {
                error!(
                    change_id = ?bad.change_id,
                    profile_id = ?bad.profile_id,
                    error = %bad.error,
                    "Cannot read change record; leaving it pending"
                );
                report.record(
                    bad.profile_id.unwrap_or_default(),
                    bad.change_id,
                    RecordOutcome::Failed(bad.error),
                );
            }
        }
    }
    if records.is_empty() {
        warn!(failed = report.failures().count(), "No readable change records");
        return Ok(report);
    }

    primary.begin()?;
    if let Err(e) = remote.begin() {
        txn::rollback_quietly(primary, StoreRole::Primary);
        return Err(e.into());
    }

    for record in &records {
        let outcome = push_record(primary, remote, record);
        log_outcome(record, &outcome);
        report.record(&record.profile_id, Some(record.id), outcome);
    }

    let applied = report.applied();
    if applied == 0 {
        txn::rollback_quietly(remote, StoreRole::Remote);
        txn::rollback_quietly(primary, StoreRole::Primary);
        warn!(
            failed = report.failures().count(),
            "No change records could be applied"
        );
        return Ok(report);
    }

    if let Err(e) = txn::commit(remote, StoreRole::Remote) {
        txn::rollback_quietly(remote, StoreRole::Remote);
        txn::rollback_quietly(primary, StoreRole::Primary);
        return Err(e);
    }
    if let Err(e) = txn::commit(primary, StoreRole::Primary) {
        // Remote writes are already durable; the records stay pending and
        // are replayed idempotently next cycle.
        txn::rollback_quietly(primary, StoreRole::Primary);
        return Err(e);
    }

    info!(
        applied,
        failed = report.failures().count(),
        skipped = report.skipped().count(),
        "Pushed change records"
    );
    Ok(report)
}

/// Applies one change record to `remote` and marks it synchronized on
/// `primary`, without any transaction handling of its own.
///
/// Replaying a record that was already applied leaves the remote in the
/// same state.
pub fn apply_change<P: Store, R: Store>(
    primary: &mut P,
    remote: &mut R,
    record: &ChangeRecord,
) -> SyncResult<ApplyAction> {
    let action = match &record.operation {
        ChangeOperation::Insert | ChangeOperation::Update => {
            upsert_remote(remote, &record.snapshot)?
        }
        ChangeOperation::Delete => {
            let removed = profiles::delete_profile(remote, &record.profile_id)?;
            if removed == 0 {
                debug!(profile_id = %record.profile_id, "Remote row already absent");
            }
            ApplyAction::Deleted
        }
        ChangeOperation::Unknown(op) => {
            return Err(SyncError::InvalidRecord(format!(
                "change record {} has unknown operation '{op}'",
                record.id
            )));
        }
    };
    changelog::mark_synchronized(primary, record.id)?;
    Ok(action)
}

fn upsert_remote<R: Store>(remote: &mut R, snapshot: &Profile) -> SyncResult<ApplyAction> {
    if profiles::profile_exists(remote, &snapshot.id)? {
        profiles::update_profile(remote, snapshot)?;
        Ok(ApplyAction::Updated)
    } else {
        profiles::insert_profile(remote, snapshot)?;
        Ok(ApplyAction::Inserted)
    }
}

fn push_record<P: Store, R: Store>(
    primary: &mut P,
    remote: &mut R,
    record: &ChangeRecord,
) -> RecordOutcome {
    if let ChangeOperation::Unknown(op) = &record.operation {
        return RecordOutcome::Skipped(SkipReason::UnknownOperation(op.clone()));
    }

    if let Err(e) = primary.savepoint(RECORD_SAVEPOINT) {
        return RecordOutcome::Failed(e.into());
    }
    if let Err(e) = remote.savepoint(RECORD_SAVEPOINT) {
        txn::undo_savepoint(primary, StoreRole::Primary);
        return RecordOutcome::Failed(e.into());
    }

    match apply_change(primary, remote, record) {
        Ok(action) => {
            if let Err(e) = remote.release(RECORD_SAVEPOINT) {
                txn::undo_savepoint(remote, StoreRole::Remote);
                txn::undo_savepoint(primary, StoreRole::Primary);
                return RecordOutcome::Failed(e.into());
            }
            if let Err(e) = primary.release(RECORD_SAVEPOINT) {
                // The remote write stands; the record stays pending and
                // replays as a no-op.
                txn::undo_savepoint(primary, StoreRole::Primary);
                return RecordOutcome::Failed(e.into());
            }
            RecordOutcome::Applied(action)
        }
        Err(e) => {
            txn::undo_savepoint(remote, StoreRole::Remote);
            txn::undo_savepoint(primary, StoreRole::Primary);
            RecordOutcome::Failed(e)
        }
    }
}

fn log_outcome(record: &ChangeRecord, outcome: &RecordOutcome) {
    let email = record.snapshot.email.as_deref().unwrap_or("");
    match outcome {
        RecordOutcome::Applied(action) => info!(
            change_id = record.id,
            profile_id = %record.profile_id,
            email,
            %action,
            "Applied change to remote"
        ),
        RecordOutcome::Skipped(reason) => warn!(
            change_id = record.id,
            profile_id = %record.profile_id,
            %reason,
            "Skipped change record"
        ),
        RecordOutcome::Failed(e) => error!(
            change_id = record.id,
            profile_id = %record.profile_id,
            error = %e,
            "Failed to sync change record"
        ),
    }
}
