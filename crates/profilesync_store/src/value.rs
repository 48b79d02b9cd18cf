//! Parameter and result values exchanged with a store.

use crate::error::{StoreError, StoreResult};
use std::sync::Arc;

/// A value bound to a statement parameter or read back from a row.
///
/// The synchronized schema only carries text, integers and booleans.
/// Reals and blobs are still read back as-is so that one malformed cell
/// fails only the accessor that reads it, not the whole query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// Boolean, stored by SQLite as `0`/`1`.
    Bool(bool),
    /// Floating point.
    Real(f64),
    /// Raw bytes, including text that is not valid UTF-8.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Creates a text value.
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    /// Creates a text value, or `NULL` for `None`.
    pub fn opt_text<S: AsRef<str>>(value: Option<S>) -> Self {
        match value {
            Some(s) => SqlValue::Text(s.as_ref().to_string()),
            None => SqlValue::Null,
        }
    }

    /// Returns true for `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Returns the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Text(_) => "text",
            SqlValue::Bool(_) => "bool",
            SqlValue::Real(_) => "real",
            SqlValue::Blob(_) => "blob",
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

/// A single result row.
///
/// Column names are shared between all rows of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row from shared column names and its values.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in select order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in select order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Returns the raw value of a column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingColumn`] if the row has no such column.
    pub fn get(&self, column: &str) -> StoreResult<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
            .ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }

    /// Returns a non-null text column.
    pub fn text(&self, column: &str) -> StoreResult<String> {
        match self.get(column)? {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(mismatch(column, "text", other)),
        }
    }

    /// Returns a nullable text column.
    pub fn opt_text(&self, column: &str) -> StoreResult<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            other => Err(mismatch(column, "text", other)),
        }
    }

    /// Returns a non-null integer column.
    pub fn integer(&self, column: &str) -> StoreResult<i64> {
        match self.get(column)? {
            SqlValue::Integer(n) => Ok(*n),
            SqlValue::Bool(b) => Ok(i64::from(*b)),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    /// Returns a boolean column. Integers are read as `value != 0`.
    pub fn bool(&self, column: &str) -> StoreResult<bool> {
        match self.get(column)? {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Integer(n) => Ok(*n != 0),
            other => Err(mismatch(column, "bool", other)),
        }
    }
}

fn mismatch(column: &str, expected: &'static str, found: &SqlValue) -> StoreError {
    StoreError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: found.type_name(),
    }
}
