//! Error types for the sync engine.

use crate::config::StoreRole;
use profilesync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Store error (connection, statement, transaction).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A stored row could not be interpreted.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Committing a stage's transaction failed.
    #[error("commit on {store} store failed: {source}")]
    Commit {
        /// Which store refused the commit.
        store: StoreRole,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// Another cycle is already running on this orchestrator.
    #[error("a sync cycle is already in progress")]
    CycleInProgress,
}

impl SyncError {
    /// Returns true if the next scheduled cycle is likely to succeed
    /// without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(e) => e.is_transient(),
            SyncError::Commit { .. } => true,
            SyncError::CycleInProgress => true,
            SyncError::Config(_) | SyncError::InvalidRecord(_) => false,
        }
    }
}

/// Configuration errors. These are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The primary endpoint was not supplied.
    #[error("primary endpoint not configured (set {var})")]
    MissingPrimaryEndpoint {
        /// Environment variable that should carry it.
        var: &'static str,
    },

    /// The remote endpoint was not supplied.
    #[error("remote endpoint not configured (set {var})")]
    MissingRemoteEndpoint {
        /// Environment variable that should carry it.
        var: &'static str,
    },

    /// An endpoint string could not be parsed.
    #[error("invalid {role} endpoint: {source}")]
    InvalidEndpoint {
        /// Which endpoint was invalid.
        role: StoreRole,
        /// Parse failure.
        #[source]
        source: StoreError,
    },
}
