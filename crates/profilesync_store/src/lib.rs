//! # profilesync store
//!
//! SQL store capability for the profilesync engine.
//!
//! The sync engine never talks to a database driver directly. It is written
//! against the [`Store`] capability: parameterized `execute`/`query` plus
//! explicit `begin`/`commit`/`rollback`/`close`. A [`Connector`] opens a
//! store for an [`Endpoint`].
//!
//! ## Design Principles
//!
//! - Statements are always parameterized; callers never splice data into SQL
//! - Transactions are explicit and owned by the caller
//! - A store that is dropped mid-transaction rolls the transaction back
//! - Backends know nothing about profiles or changelogs
//!
//! ## Available Backends
//!
//! - [`SqliteStore`] / [`SqliteConnector`] - SQLite through `rusqlite`
//!
//! ## Example
//!
//! ```rust
//! use profilesync_store::{Connector, Endpoint, SqlValue, SqliteConnector, Store};
//!
//! let mut store = SqliteConnector::new().connect(&Endpoint::Memory).unwrap();
//! store.execute("CREATE TABLE t (id TEXT PRIMARY KEY)", &[]).unwrap();
//! store.execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::text("a")]).unwrap();
//! let rows = store.query("SELECT id FROM t", &[]).unwrap();
//! assert_eq!(rows[0].text("id").unwrap(), "a");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod endpoint;
mod error;
mod sqlite;
mod value;

pub use backend::{Connector, Store};
pub use endpoint::Endpoint;
pub use error::{StoreError, StoreResult};
pub use sqlite::{SqliteConnector, SqliteStore, DEFAULT_BUSY_TIMEOUT};
pub use value::{Row, SqlValue};
