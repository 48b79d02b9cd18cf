//! Store capability trait definitions.

use crate::endpoint::Endpoint;
use crate::error::StoreResult;
use crate::value::{Row, SqlValue};

/// A relational store the sync engine reads from and writes to.
///
/// Stores are **dumb SQL executors**. They run parameterized statements and
/// expose explicit transaction control. All knowledge of profiles,
/// changelogs and conflict policy lives in the engine.
///
/// # Invariants
///
/// - `execute` and `query` only bind values through `params`
/// - `commit` and `rollback` fail with `NoTransaction` outside `begin`
/// - Dropping a store with an open transaction rolls it back
/// - A store is used by one sync stage at a time
///
/// # Implementors
///
/// - [`super::SqliteStore`] - SQLite through `rusqlite`
pub trait Store {
    /// Executes a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared or fails.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<usize>;

    /// Runs a query and returns every result row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a column holds a value type
    /// that [`SqlValue`] cannot represent.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<Vec<Row>>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionActive` if one is already open.
    fn begin(&mut self) -> StoreResult<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoTransaction` if none is open, or the driver error. On a
    /// driver error the transaction may still be open and should be rolled
    /// back by the caller.
    fn commit(&mut self) -> StoreResult<()>;

    /// Rolls back the open transaction. A no-op when none is open.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the rollback itself fails.
    fn rollback(&mut self) -> StoreResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Rolls back anything still open and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the connection could not be closed
    /// cleanly; the connection is released either way.
    fn close(self) -> StoreResult<()>
    where
        Self: Sized;

    /// Opens a named savepoint inside the current transaction.
    ///
    /// `name` must be a plain identifier chosen by the caller, never data.
    fn savepoint(&mut self, name: &str) -> StoreResult<()> {
        self.execute(&format!("SAVEPOINT {name}"), &[]).map(|_| ())
    }

    /// Releases a savepoint, keeping its changes in the transaction.
    fn release(&mut self, name: &str) -> StoreResult<()> {
        self.execute(&format!("RELEASE SAVEPOINT {name}"), &[])
            .map(|_| ())
    }

    /// Undoes everything since the savepoint and removes it.
    fn rollback_to(&mut self, name: &str) -> StoreResult<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])?;
        self.release(name)
    }
}

/// Opens stores for endpoints.
///
/// The orchestrator connects at the start of each stage and closes at the
/// end, so a connector is asked for a fresh store every stage.
pub trait Connector {
    /// The store type this connector produces.
    type Store: Store;

    /// Opens a store for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unsupported or unreachable.
    fn connect(&self, endpoint: &Endpoint) -> StoreResult<Self::Store>;
}
