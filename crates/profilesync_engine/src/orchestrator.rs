//! Sync cycle orchestration.
//!
//! A cycle is provision → push → diff, each stage on fresh connections
//! that are closed before the next stage starts. Stage failures are
//! recorded in the [`CycleReport`] and logged; [`SyncOrchestrator::run_cycle`]
//! itself never fails, so a scheduler can simply call it again next
//! interval.

use crate::changelog;
use crate::config::{StoreRole, SyncConfig};
use crate::diff::diff_sync_with;
use crate::error::{SyncError, SyncResult};
use crate::model::ChangeRecord;
use crate::profiles;
use crate::push::push;
use crate::report::ApplyReport;
use crate::schema::{ensure_primary_schema, ensure_schema};
use parking_lot::RwLock;
use profilesync_store::{Connector, SqliteConnector, Store};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// State of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Ensuring the remote schema exists.
    Provisioning,
    /// Replaying the changelog onto the remote.
    Pushing,
    /// Diffing the remote snapshot into the primary.
    Diffing,
    /// The last cycle finished without a stage failure.
    Synced,
    /// The last cycle had a stage failure.
    Error,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Provisioning | SyncState::Pushing | SyncState::Diffing
        )
    }

    /// Returns true if a new cycle may start.
    pub fn can_start_cycle(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics accumulated across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that finished without a stage failure.
    pub cycles_completed: u64,
    /// Cycles with at least one stage failure.
    pub cycles_failed: u64,
    /// Change records pushed to the remote.
    pub total_pushed: u64,
    /// Remote changes applied to the primary.
    pub total_diffed: u64,
    /// When the last cycle finished.
    pub last_cycle_at: Option<Instant>,
    /// The last stage failure, if any.
    pub last_error: Option<String>,
}

/// A stage of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Remote schema provisioning.
    Provision,
    /// Primary → remote.
    Push,
    /// Remote → primary.
    Diff,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Provision => f.write_str("provision"),
            Stage::Push => f.write_str("push"),
            Stage::Diff => f.write_str("diff"),
        }
    }
}

/// What happened to one stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The stage ran to completion.
    Completed(T),
    /// The stage failed as a whole.
    Failed(SyncError),
    /// The stage was not attempted.
    NotRun,
}

impl<T> StageOutcome<T> {
    /// Returns the stage's output if it completed.
    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the stage's error if it failed.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            StageOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn from_result(result: SyncResult<T>) -> Self {
        match result {
            Ok(value) => StageOutcome::Completed(value),
            Err(e) => StageOutcome::Failed(e),
        }
    }
}

/// Result of one cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Records applied primary → remote.
    pub pushed: u64,
    /// Records applied remote → primary.
    pub diffed: u64,
    /// Provisioning stage.
    pub provision: StageOutcome<()>,
    /// Push stage.
    pub push: StageOutcome<ApplyReport>,
    /// Diff stage.
    pub diff: StageOutcome<ApplyReport>,
    /// Wall-clock time of the cycle.
    pub duration: Duration,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            pushed: 0,
            diffed: 0,
            provision: StageOutcome::NotRun,
            push: StageOutcome::NotRun,
            diff: StageOutcome::NotRun,
            duration: Duration::ZERO,
        }
    }

    /// Total records applied in both directions.
    pub fn total(&self) -> u64 {
        self.pushed + self.diffed
    }

    /// Returns true if every stage completed.
    ///
    /// Record-level failures do not count; see [`Self::record_failures`].
    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
            && self.provision.completed().is_some()
            && self.push.completed().is_some()
            && self.diff.completed().is_some()
    }

    /// Stage-level failures, in stage order.
    pub fn failures(&self) -> Vec<(Stage, &SyncError)> {
        [
            (Stage::Provision, self.provision.error()),
            (Stage::Push, self.push.error()),
            (Stage::Diff, self.diff.error()),
        ]
        .into_iter()
        .filter_map(|(stage, e)| e.map(|e| (stage, e)))
        .collect()
    }

    /// Number of individual records that failed and will be retried.
    pub fn record_failures(&self) -> usize {
        [self.push.completed(), self.diff.completed()]
            .into_iter()
            .flatten()
            .map(|r| r.failures().count())
            .sum()
    }

    /// One-line summary of the cycle.
    pub fn summary(&self) -> String {
        match self.total() {
            0 => "in sync".to_string(),
            n => format!("processed {n} change(s)"),
        }
    }
}

/// Row and changelog counts for both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Unsynchronized change records on the primary.
    pub pending_changes: u64,
    /// Rows in the primary `profiles` table.
    pub primary_profiles: u64,
    /// Rows in the remote `profiles` table.
    pub remote_profiles: u64,
}

/// Runs sync cycles between a primary and a remote store.
///
/// Cycles on one orchestrator are serialized: starting a cycle while
/// another is running yields a report whose provision stage failed with
/// [`SyncError::CycleInProgress`]. Separate processes pointed at the same
/// stores are not coordinated.
pub struct SyncOrchestrator<C: Connector = SqliteConnector> {
    config: SyncConfig,
    connector: C,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl SyncOrchestrator<SqliteConnector> {
    /// Creates an orchestrator using SQLite connections built from `config`.
    pub fn sqlite(config: SyncConfig) -> Self {
        let connector = config.sqlite_connector();
        Self::new(config, connector)
    }
}

impl<C: Connector> SyncOrchestrator<C> {
    /// Creates a new orchestrator.
    pub fn new(config: SyncConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Runs one provision → push → diff cycle.
    ///
    /// Never returns an error: every stage failure is logged and recorded
    /// in the report. The diff runs even when the push stage failed, but
    /// without its deletion pass, since local rows the push could not
    /// deliver would look like remote deletions.
    pub fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new();

        {
            let mut state = self.state.write();
            if !state.can_start_cycle() {
                warn!(state = ?*state, "Sync cycle rejected");
                report.provision = StageOutcome::Failed(SyncError::CycleInProgress);
                return report;
            }
            *state = SyncState::Provisioning;
        }
        info!(
            primary = %self.config.primary,
            remote = %self.config.remote,
            "Starting sync cycle"
        );

        report.provision = StageOutcome::from_result(self.provision());
        if report.provision.error().is_none() {
            self.set_state(SyncState::Pushing);
            report.push = StageOutcome::from_result(self.with_pair(|p, r| push(p, r)));
            report.pushed = report.push.completed().map_or(0, ApplyReport::applied);

            self.set_state(SyncState::Diffing);
            let mut options = self.config.diff_options();
            if report.push.error().is_some() {
                warn!("Push did not complete; withholding deletions from the diff");
                options.withhold_deletes = true;
            }
            report.diff =
                StageOutcome::from_result(self.with_pair(|p, r| diff_sync_with(r, p, &options)));
            report.diffed = report.diff.completed().map_or(0, ApplyReport::applied);
        }

        report.duration = started.elapsed();
        self.finish(&report);
        report
    }

    /// Counts pending change records and rows on both stores.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        self.with_pair(|primary, remote| {
            Ok(SyncStatus {
                pending_changes: changelog::pending_count(primary)?,
                primary_profiles: profiles::count_profiles(primary)?,
                remote_profiles: profiles::count_profiles(remote)?,
            })
        })
    }

    /// Lists the primary's pending change records in replay order.
    pub fn pending_changes(&self) -> SyncResult<Vec<ChangeRecord>> {
        let mut primary = self.connect(StoreRole::Primary)?;
        let result = changelog::read_pending(&mut primary);
        close_quietly(primary, StoreRole::Primary);
        result
    }

    /// Creates `profiles` and `change_log` on the primary and `profiles`
    /// on the remote.
    pub fn initialize(&self) -> SyncResult<()> {
        self.with_pair(|primary, remote| {
            ensure_primary_schema(primary)?;
            ensure_schema(remote)
        })
    }

    fn provision(&self) -> SyncResult<()> {
        let mut remote = self.connect(StoreRole::Remote)?;
        let result = ensure_schema(&mut remote);
        close_quietly(remote, StoreRole::Remote);
        result
    }

    fn connect(&self, role: StoreRole) -> SyncResult<C::Store> {
        Ok(self.connector.connect(self.config.endpoint(role))?)
    }

    /// Runs `f` on fresh primary and remote connections, closing both on
    /// every path.
    fn with_pair<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&mut C::Store, &mut C::Store) -> SyncResult<T>,
    {
        let mut primary = self.connect(StoreRole::Primary)?;
        let mut remote = match self.connect(StoreRole::Remote) {
            Ok(remote) => remote,
            Err(e) => {
                close_quietly(primary, StoreRole::Primary);
                return Err(e);
            }
        };
        let result = f(&mut primary, &mut remote);
        close_quietly(remote, StoreRole::Remote);
        close_quietly(primary, StoreRole::Primary);
        result
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn finish(&self, report: &CycleReport) {
        let failures = report.failures();
        for (stage, e) in &failures {
            error!(%stage, error = %e, retryable = e.is_retryable(), "Sync stage failed");
        }

        {
            let mut stats = self.stats.write();
            stats.total_pushed += report.pushed;
            stats.total_diffed += report.diffed;
            stats.last_cycle_at = Some(Instant::now());
            match failures.last() {
                None => stats.cycles_completed += 1,
                Some((stage, e)) => {
                    stats.cycles_failed += 1;
                    stats.last_error = Some(format!("{stage}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            self.set_state(SyncState::Synced);
            info!(
                pushed = report.pushed,
                diffed = report.diffed,
                record_failures = report.record_failures(),
                elapsed_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
                "Sync cycle complete: {}",
                report.summary()
            );
        } else {
            self.set_state(SyncState::Error);
            warn!(
                pushed = report.pushed,
                diffed = report.diffed,
                "Sync cycle finished with failures: {}",
                report.summary()
            );
        }
    }
}

fn close_quietly<S: Store>(store: S, role: StoreRole) {
    if let Err(e) = store.close() {
        warn!(store = %role, error = %e, "Failed to close connection");
    }
}
