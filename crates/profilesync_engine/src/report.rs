//! Per-record apply outcomes.

use crate::error::SyncError;
use std::fmt;

/// Which way an applier moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Changelog replay onto the remote.
    PrimaryToRemote,
    /// Snapshot diff into the primary.
    RemoteToPrimary,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::PrimaryToRemote => f.write_str("primary -> remote"),
            Direction::RemoteToPrimary => f.write_str("remote -> primary"),
        }
    }
}

/// The write an applied record performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    /// Row inserted on the target.
    Inserted,
    /// Row overwritten on the target.
    Updated,
    /// Row deleted from the target (or already absent).
    Deleted,
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyAction::Inserted => f.write_str("INSERT"),
            ApplyAction::Updated => f.write_str("UPDATE"),
            ApplyAction::Deleted => f.write_str("DELETE"),
        }
    }
}

/// Why a record was deliberately left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The change record carries an operation this engine does not know.
    UnknownOperation(String),
    /// The primary row is as new as or newer than the remote row.
    PrimaryNotOlder,
    /// One side has no `updated_at`.
    MissingTimestamp,
    /// Tombstone deletion withheld: the row has unsynchronized local changes.
    PendingLocalChange,
    /// Tombstone deletion withheld for the whole run.
    DeletionWithheld,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownOperation(op) => write!(f, "unknown operation '{op}'"),
            SkipReason::PrimaryNotOlder => f.write_str("primary is not older"),
            SkipReason::MissingTimestamp => f.write_str("missing updated_at"),
            SkipReason::PendingLocalChange => f.write_str("pending local change"),
            SkipReason::DeletionWithheld => f.write_str("deletions withheld"),
        }
    }
}

/// What happened to one record.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The write was applied and will be committed with the batch.
    Applied(ApplyAction),
    /// Nothing was written, on purpose.
    Skipped(SkipReason),
    /// The write failed and was rolled back; the next cycle retries it.
    Failed(SyncError),
}

impl RecordOutcome {
    /// Returns true for [`RecordOutcome::Applied`].
    pub fn is_applied(&self) -> bool {
        matches!(self, RecordOutcome::Applied(_))
    }

    /// Returns true for [`RecordOutcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, RecordOutcome::Failed(_))
    }
}

/// Outcome of one record, with the ids needed to find it again.
#[derive(Debug)]
pub struct RecordReport {
    /// Profile the record concerns.
    pub profile_id: String,
    /// Change record id, for pushes.
    pub change_id: Option<i64>,
    /// What happened.
    pub outcome: RecordOutcome,
}

/// Everything one applier run did.
#[derive(Debug)]
pub struct ApplyReport {
    /// Direction of the run.
    pub direction: Direction,
    /// One entry per record considered, in processing order.
    pub records: Vec<RecordReport>,
}

impl ApplyReport {
    /// Creates an empty report.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            records: Vec::new(),
        }
    }

    pub(crate) fn record(
        &mut self,
        profile_id: impl Into<String>,
        change_id: Option<i64>,
        outcome: RecordOutcome,
    ) {
        self.records.push(RecordReport {
            profile_id: profile_id.into(),
            change_id,
            outcome,
        });
    }

    /// Number of applied records. This is the count a stage reports.
    pub fn applied(&self) -> u64 {
        self.records.iter().filter(|r| r.outcome.is_applied()).count() as u64
    }

    /// Records that failed.
    pub fn failures(&self) -> impl Iterator<Item = &RecordReport> {
        self.records.iter().filter(|r| r.outcome.is_failed())
    }

    /// Records that were skipped.
    pub fn skipped(&self) -> impl Iterator<Item = &RecordReport> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RecordOutcome::Skipped(_)))
    }

    /// Records applied with a given action.
    pub fn applied_with(&self, action: ApplyAction) -> u64 {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RecordOutcome::Applied(a) if a == action))
            .count() as u64
    }

    /// Outcome recorded for a profile, if it was considered.
    pub fn outcome_for(&self, profile_id: &str) -> Option<&RecordOutcome> {
        self.records
            .iter()
            .find(|r| r.profile_id == profile_id)
            .map(|r| &r.outcome)
    }
}
