//! SQLite store backed by `rusqlite`.

use crate::backend::{Connector, Store};
use crate::endpoint::Endpoint;
use crate::error::{StoreError, StoreResult};
use crate::value::{Row, SqlValue};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Busy timeout applied to every connection unless overridden.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes.as_slice())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(n) => SqlValue::Integer(n),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => SqlValue::Text(s.to_string()),
            Err(_) => SqlValue::Blob(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

/// A [`Store`] over a single SQLite connection.
///
/// Transaction state is read from the connection itself
/// (`sqlite3_get_autocommit`), so a transaction SQLite aborted on its own
/// is never reported as still open.
pub struct SqliteStore {
    conn: Option<Connection>,
    endpoint: Endpoint,
}

impl SqliteStore {
    /// Opens a store for `endpoint` with the default busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(endpoint: &Endpoint) -> StoreResult<Self> {
        SqliteConnector::new().connect(endpoint)
    }

    /// The endpoint this store was opened for.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("endpoint", &self.endpoint)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl Store for SqliteStore {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<usize> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
        Ok(affected)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> StoreResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(from_value_ref))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn begin(&mut self) -> StoreResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            return Err(StoreError::TransactionActive);
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Err(StoreError::NoTransaction);
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.conn
            .as_ref()
            .map(|c| !c.is_autocommit())
            .unwrap_or(false)
    }

    fn close(mut self) -> StoreResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            debug!(endpoint = %self.endpoint, "Rolling back open transaction on close");
            conn.execute_batch("ROLLBACK")?;
        }
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !conn.is_autocommit() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!(endpoint = %self.endpoint, error = %e, "Rollback on drop failed");
                }
            }
        }
    }
}

/// Opens [`SqliteStore`]s.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    busy_timeout: Duration,
}

impl SqliteConnector {
    /// Creates a connector with [`DEFAULT_BUSY_TIMEOUT`].
    pub fn new() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Sets how long a statement waits on a locked database before failing.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// The configured busy timeout.
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SqliteConnector {
    type Store = SqliteStore;

    fn connect(&self, endpoint: &Endpoint) -> StoreResult<SqliteStore> {
        let conn = match endpoint {
            Endpoint::Memory => Connection::open_in_memory()?,
            Endpoint::Sqlite(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            StoreError::InvalidEndpoint {
                                endpoint: endpoint.to_string(),
                                reason: e.to_string(),
                            }
                        })?;
                    }
                }
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                conn
            }
        };
        conn.busy_timeout(self.busy_timeout)?;

        debug!(%endpoint, "Opened SQLite store");
        Ok(SqliteStore {
            conn: Some(conn),
            endpoint: endpoint.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory_store() -> SqliteStore {
        let mut store = SqliteStore::open(&Endpoint::Memory).unwrap();
        store
            .execute("CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER, flag INTEGER)", &[])
            .unwrap();
        store
    }

    fn count(store: &mut SqliteStore) -> i64 {
        store.query("SELECT COUNT(*) AS c FROM t", &[]).unwrap()[0]
            .integer("c")
            .unwrap()
    }

    #[test]
    fn execute_and_query() {
        let mut store = memory_store();
        let affected = store
            .execute(
                "INSERT INTO t (id, n, flag) VALUES (?1, ?2, ?3)",
                &[SqlValue::text("a"), SqlValue::Integer(7), SqlValue::Bool(true)],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = store
            .query("SELECT id, n, flag FROM t WHERE id = ?1", &[SqlValue::text("a")])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("id").unwrap(), "a");
        assert_eq!(rows[0].integer("n").unwrap(), 7);
        assert!(rows[0].bool("flag").unwrap());
    }

    #[test]
    fn commit_and_rollback() {
        let mut store = memory_store();

        store.begin().unwrap();
        assert!(store.in_transaction());
        store
            .execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("a")])
            .unwrap();
        store.rollback().unwrap();
        assert!(!store.in_transaction());
        assert_eq!(count(&mut store), 0);

        store.begin().unwrap();
        store
            .execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("b")])
            .unwrap();
        store.commit().unwrap();
        assert_eq!(count(&mut store), 1);
    }

    #[test]
    fn transaction_misuse() {
        let mut store = memory_store();
        assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
        store.rollback().unwrap();

        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(StoreError::TransactionActive)));
    }

    #[test]
    fn savepoint_isolates_failed_statement() {
        let mut store = memory_store();
        store.begin().unwrap();

        store.savepoint("rec").unwrap();
        store
            .execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("a")])
            .unwrap();
        store.release("rec").unwrap();

        store.savepoint("rec").unwrap();
        store
            .execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("b")])
            .unwrap();
        let dup = store.execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("a")]);
        assert!(dup.is_err());
        store.rollback_to("rec").unwrap();

        store.commit().unwrap();
        let rows = store.query("SELECT id FROM t ORDER BY id", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("id").unwrap(), "a");
    }

    #[test]
    fn drop_rolls_back_open_transaction() {
        let dir = tempdir().unwrap();
        let endpoint = Endpoint::sqlite(dir.path().join("drop.db"));

        {
            let mut store = SqliteStore::open(&endpoint).unwrap();
            store.execute("CREATE TABLE t (id TEXT PRIMARY KEY)", &[]).unwrap();
            store.begin().unwrap();
            store
                .execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("a")])
                .unwrap();
        }

        let mut store = SqliteStore::open(&endpoint).unwrap();
        let rows = store.query("SELECT id FROM t", &[]).unwrap();
        assert!(rows.is_empty());
        store.close().unwrap();
    }

    #[test]
    fn file_store_persists_across_connections() {
        let dir = tempdir().unwrap();
        let endpoint = Endpoint::sqlite(dir.path().join("nested").join("store.db"));
        let connector = SqliteConnector::new().with_busy_timeout(Duration::from_millis(250));

        let mut store = connector.connect(&endpoint).unwrap();
        store.execute("CREATE TABLE t (id TEXT PRIMARY KEY)", &[]).unwrap();
        store
            .execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("kept")])
            .unwrap();
        store.close().unwrap();

        let mut store = connector.connect(&endpoint).unwrap();
        let rows = store.query("SELECT id FROM t", &[]).unwrap();
        assert_eq!(rows[0].text("id").unwrap(), "kept");
    }

    #[test]
    fn unexpected_types_are_read_back() {
        let mut store = memory_store();
        let rows = store
            .query("SELECT 1.5 AS r, X'00FF' AS b, 'ok' AS t", &[])
            .unwrap();
        assert_eq!(rows[0].get("r").unwrap(), &SqlValue::Real(1.5));
        assert_eq!(rows[0].get("b").unwrap(), &SqlValue::Blob(vec![0x00, 0xff]));
        assert!(matches!(
            rows[0].text("b"),
            Err(StoreError::TypeMismatch { found: "blob", .. })
        ));
        assert_eq!(rows[0].text("t").unwrap(), "ok");
    }
}
