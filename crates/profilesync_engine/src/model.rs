//! Profile and change record types.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use profilesync_store::{Row, SqlValue};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use tracing::warn;

/// The synchronized entity.
///
/// `id` is assigned once and never changes; it is the only join key
/// between the two stores. Every other field is nullable in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque, globally unique identifier.
    pub id: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Username.
    pub username: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Account type.
    pub account_type: Option<String>,
    /// Avatar reference.
    pub avatar_url: Option<String>,
    /// Creation time.
    pub created_at: Option<Timestamp>,
    /// Last modification time, used for last-writer-wins.
    pub updated_at: Option<Timestamp>,
    /// Owning user reference.
    pub owner_user_id: Option<String>,
}

impl Profile {
    /// Creates a profile with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            username: None,
            email: None,
            account_type: None,
            avatar_url: None,
            created_at: None,
            updated_at: None,
            owner_user_id: None,
        }
    }

    /// Sets the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the modification time.
    pub fn with_updated_at(mut self, updated_at: impl Into<Timestamp>) -> Self {
        self.updated_at = Some(updated_at.into());
        self
    }

    /// Sets the creation time.
    pub fn with_created_at(mut self, created_at: impl Into<Timestamp>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    /// Reads a profile from a row, taking the id from `id_column`.
    ///
    /// `profiles` rows use `id`; change records carry it as `profile_id`.
    pub(crate) fn from_row(row: &Row, id_column: &str) -> SyncResult<Self> {
        Ok(Self {
            id: row.text(id_column)?,
            display_name: row.opt_text("display_name")?,
            username: row.opt_text("username")?,
            email: row.opt_text("email")?,
            account_type: row.opt_text("account_type")?,
            avatar_url: row.opt_text("avatar_url")?,
            created_at: stored_timestamp(row, "created_at")?,
            updated_at: stored_timestamp(row, "updated_at")?,
            owner_user_id: row.opt_text("owner_user_id")?,
        })
    }

    /// The parsed `updated_at`, if present and readable.
    pub fn updated_instant(&self) -> Option<DateTime<Utc>> {
        self.updated_at.as_ref().and_then(Timestamp::instant)
    }

    /// Non-key fields in `profiles` column order.
    ///
    /// Timestamps are bound as the text they were read with.
    pub(crate) fn field_values(&self) -> [SqlValue; 8] {
        [
            SqlValue::opt_text(self.display_name.as_deref()),
            SqlValue::opt_text(self.username.as_deref()),
            SqlValue::opt_text(self.email.as_deref()),
            SqlValue::opt_text(self.account_type.as_deref()),
            SqlValue::opt_text(self.avatar_url.as_deref()),
            SqlValue::opt_text(self.created_at.as_ref().map(Timestamp::as_str)),
            SqlValue::opt_text(self.updated_at.as_ref().map(Timestamp::as_str)),
            SqlValue::opt_text(self.owner_user_id.as_deref()),
        ]
    }
}

/// A stored row that could not be read into its model type.
///
/// Carries whatever identifiers were still readable so the row can be
/// reported and found again.
#[derive(Debug)]
pub struct UndecodableRow {
    /// Change record id, for `change_log` rows.
    pub change_id: Option<i64>,
    /// Profile id, if that column itself was readable.
    pub profile_id: Option<String>,
    /// Why decoding failed.
    pub error: SyncError,
}

/// A stored timestamp column.
///
/// Keeps the text exactly as the store returned it, so copying a row never
/// rewrites the value, plus the instant it parses to. Text that does not
/// parse has no instant and counts as missing for last-writer-wins.
/// Equality compares the stored text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Timestamp {
    raw: String,
    instant: Option<DateTime<Utc>>,
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Timestamp {}

impl Timestamp {
    /// Wraps stored text, parsing it with [`parse_timestamp`].
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let instant = parse_timestamp(&raw);
        Self { raw, instant }
    }

    /// The stored text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed instant, or `None` if the text is not a timestamp.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.instant
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Self {
            raw: format_timestamp(ts),
            instant: Some(ts),
        }
    }
}

impl From<String> for Timestamp {
    fn from(raw: String) -> Self {
        Self::parse(raw)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.raw
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Kind of local mutation a change record describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOperation {
    /// Row inserted on the primary.
    Insert,
    /// Row updated on the primary.
    Update,
    /// Row deleted on the primary.
    Delete,
    /// An operation string this engine does not understand.
    Unknown(String),
}

impl ChangeOperation {
    /// Parses the stored operation string (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INSERT" => ChangeOperation::Insert,
            "UPDATE" => ChangeOperation::Update,
            "DELETE" => ChangeOperation::Delete,
            _ => ChangeOperation::Unknown(raw.to_string()),
        }
    }

    /// The stored spelling.
    pub fn as_str(&self) -> &str {
        match self {
            ChangeOperation::Insert => "INSERT",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
            ChangeOperation::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChangeOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A logged local mutation on the primary.
///
/// The snapshot is a denormalized copy of the profile at the time of the
/// mutation, so a delete can still be described after the row is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// Record identifier.
    pub id: i64,
    /// Profile the change applies to.
    pub profile_id: String,
    /// What happened.
    pub operation: ChangeOperation,
    /// Profile fields as of the mutation. `snapshot.id == profile_id`.
    pub snapshot: Profile,
    /// When the mutation happened.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Whether the record has been applied to the remote.
    pub synchronized: bool,
}

impl ChangeRecord {
    pub(crate) fn from_row(row: &Row) -> SyncResult<Self> {
        let snapshot = Profile::from_row(row, "profile_id")?;
        Ok(Self {
            id: row.integer("id")?,
            profile_id: snapshot.id.clone(),
            operation: ChangeOperation::parse(&row.text("operation")?),
            occurred_at: stored_timestamp(row, "occurred_at")?.and_then(|ts| ts.instant()),
            synchronized: row.bool("synchronized")?,
            snapshot,
        })
    }
}

fn stored_timestamp(row: &Row, column: &str) -> SyncResult<Option<Timestamp>> {
    let Some(raw) = row.opt_text(column)? else {
        return Ok(None);
    };
    let ts = Timestamp::parse(raw);
    if ts.instant().is_none() {
        warn!(column, value = %ts, "Unparsable timestamp treated as missing");
    }
    Ok(Some(ts))
}

/// Parses a stored timestamp.
///
/// Accepts RFC 3339, SQLite's `YYYY-MM-DD HH:MM:SS[.fff]` (read as UTC) and
/// the same with a trailing numeric offset. Anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Formats a timestamp the way this engine stores it (RFC 3339, UTC,
/// microsecond precision).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
