//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The endpoint string could not be understood.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint as given.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A row did not carry the requested column.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// A column held a value of an unexpected type.
    #[error("column {column} has unexpected type: expected {expected}, found {found}")]
    TypeMismatch {
        /// Column name.
        column: String,
        /// Type the caller asked for.
        expected: &'static str,
        /// Type actually stored.
        found: &'static str,
    },

    /// `commit` or `rollback` without an open transaction.
    #[error("no transaction is active")]
    NoTransaction,

    /// `begin` while a transaction is already open.
    #[error("a transaction is already active")]
    TransactionActive,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// A failure injected by a test harness.
    #[error("injected failure: {0}")]
    Injected(String),
}

impl StoreError {
    /// Returns true if the failure is likely transient (lock contention).
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
