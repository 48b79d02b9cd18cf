//! Configuration for the sync engine.

use crate::diff::DiffOptions;
use crate::error::ConfigError;
use profilesync_store::{Endpoint, SqliteConnector, DEFAULT_BUSY_TIMEOUT};
use std::fmt;
use std::time::Duration;

/// Environment variable holding the primary endpoint.
pub const PRIMARY_ENDPOINT_VAR: &str = "DATABASE_URL";

/// Environment variable holding the remote endpoint.
pub const REMOTE_ENDPOINT_VAR: &str = "EXTERNAL_DB_URL";

/// Snapshot size above which the diff logs a scaling warning.
pub const DEFAULT_SNAPSHOT_WARN_ROWS: usize = 10_000;

/// Which side of the pair a store plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreRole {
    /// The store where user-facing writes land and are changelogged.
    Primary,
    /// The independently writable replica.
    Remote,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreRole::Primary => f.write_str("primary"),
            StoreRole::Remote => f.write_str("remote"),
        }
    }
}

/// Configuration for sync cycles.
///
/// Passed to [`crate::SyncOrchestrator::new`]; there is no process-wide
/// configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Primary store endpoint.
    pub primary: Endpoint,
    /// Remote store endpoint.
    pub remote: Endpoint,
    /// How long a statement waits on a locked database.
    pub busy_timeout: Duration,
    /// Snapshot size above which the diff warns about full-table cost.
    pub snapshot_warn_rows: usize,
    /// Keep primary rows with unsynchronized change records out of
    /// tombstone deletion.
    pub tombstone_guard: bool,
}

impl SyncConfig {
    /// Creates a configuration for the given endpoints.
    pub fn new(primary: Endpoint, remote: Endpoint) -> Self {
        Self {
            primary,
            remote,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            snapshot_warn_rows: DEFAULT_SNAPSHOT_WARN_ROWS,
            tombstone_guard: false,
        }
    }

    /// Reads endpoints from [`PRIMARY_ENDPOINT_VAR`] and [`REMOTE_ENDPOINT_VAR`].
    ///
    /// # Errors
    ///
    /// A missing remote endpoint is reported before anything else: without
    /// it no cycle may start.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let remote = non_empty(REMOTE_ENDPOINT_VAR).ok_or(ConfigError::MissingRemoteEndpoint {
            var: REMOTE_ENDPOINT_VAR,
        })?;
        let primary = non_empty(PRIMARY_ENDPOINT_VAR).ok_or(
            ConfigError::MissingPrimaryEndpoint {
                var: PRIMARY_ENDPOINT_VAR,
            },
        )?;

        Self::parse(&primary, &remote)
    }

    /// Parses endpoint strings into a configuration.
    pub fn parse(primary: &str, remote: &str) -> Result<Self, ConfigError> {
        let remote = remote
            .parse::<Endpoint>()
            .map_err(|source| ConfigError::InvalidEndpoint {
                role: StoreRole::Remote,
                source,
            })?;
        let primary = primary
            .parse::<Endpoint>()
            .map_err(|source| ConfigError::InvalidEndpoint {
                role: StoreRole::Primary,
                source,
            })?;
        Ok(Self::new(primary, remote))
    }

    /// Sets the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the snapshot warning threshold.
    pub fn with_snapshot_warn_rows(mut self, rows: usize) -> Self {
        self.snapshot_warn_rows = rows;
        self
    }

    /// Enables or disables the tombstone guard.
    pub fn with_tombstone_guard(mut self, enabled: bool) -> Self {
        self.tombstone_guard = enabled;
        self
    }

    /// Returns the endpoint for a role.
    pub fn endpoint(&self, role: StoreRole) -> &Endpoint {
        match role {
            StoreRole::Primary => &self.primary,
            StoreRole::Remote => &self.remote,
        }
    }

    /// Options handed to the diff applier.
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            tombstone_guard: self.tombstone_guard,
            snapshot_warn_rows: self.snapshot_warn_rows,
            withhold_deletes: false,
        }
    }

    /// A SQLite connector honouring this configuration.
    pub fn sqlite_connector(&self) -> SqliteConnector {
        SqliteConnector::new().with_busy_timeout(self.busy_timeout)
    }
}
