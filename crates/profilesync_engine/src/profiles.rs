//! Profile table access shared by both appliers.

use crate::error::SyncResult;
use crate::model::{Profile, UndecodableRow};
use profilesync_store::{SqlValue, Store};

/// Column list of `profiles`, in the order [`Profile`] binds them.
pub const PROFILE_COLUMNS: &str =
    "id, display_name, username, email, account_type, avatar_url, created_at, updated_at, owner_user_id";

/// Loads every profile, ordered by id.
///
/// Fails on the first row that cannot be decoded; see [`scan_profiles`].
pub fn load_profiles<S: Store>(store: &mut S) -> SyncResult<Vec<Profile>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY id");
    store
        .query(&sql, &[])?
        .iter()
        .map(|row| Profile::from_row(row, "id"))
        .collect()
}

/// One `profiles` row, decoded or not.
pub type ProfileEntry = Result<Profile, UndecodableRow>;

/// Loads every profile ordered by id, decoding each row on its own.
///
/// A row that cannot be read (a NULL id, a blob in a text column) is
/// returned as an [`UndecodableRow`] instead of failing the load.
pub fn scan_profiles<S: Store>(store: &mut S) -> SyncResult<Vec<ProfileEntry>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY id");
    Ok(store
        .query(&sql, &[])?
        .iter()
        .map(|row| {
            Profile::from_row(row, "id").map_err(|error| UndecodableRow {
                change_id: None,
                profile_id: row.text("id").ok(),
                error,
            })
        })
        .collect())
}

/// Loads one profile.
pub fn find_profile<S: Store>(store: &mut S, id: &str) -> SyncResult<Option<Profile>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
    match store.query(&sql, &[SqlValue::text(id)])?.first() {
        Some(row) => Ok(Some(Profile::from_row(row, "id")?)),
        None => Ok(None),
    }
}

/// Returns true if a row with `id` exists.
pub fn profile_exists<S: Store>(store: &mut S, id: &str) -> SyncResult<bool> {
    let rows = store.query("SELECT id FROM profiles WHERE id = ?1", &[SqlValue::text(id)])?;
    Ok(!rows.is_empty())
}

/// Inserts a profile with every field.
pub fn insert_profile<S: Store>(store: &mut S, profile: &Profile) -> SyncResult<()> {
    let mut params = Vec::with_capacity(9);
    params.push(SqlValue::text(&profile.id));
    params.extend(profile.field_values());
    store.execute(
        "INSERT INTO profiles (id, display_name, username, email, account_type, avatar_url, created_at, updated_at, owner_user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        &params,
    )?;
    Ok(())
}

/// Overwrites every mutable field of an existing profile.
///
/// `created_at` is left as stored; it is set once by whichever side
/// created the row. Returns the number of rows changed.
pub fn update_profile<S: Store>(store: &mut S, profile: &Profile) -> SyncResult<usize> {
    let [display_name, username, email, account_type, avatar_url, _created_at, updated_at, owner_user_id] =
        profile.field_values();
    let changed = store.execute(
        "UPDATE profiles SET
            display_name = ?1,
            username = ?2,
            email = ?3,
            account_type = ?4,
            avatar_url = ?5,
            updated_at = ?6,
            owner_user_id = ?7
         WHERE id = ?8",
        &[
            display_name,
            username,
            email,
            account_type,
            avatar_url,
            updated_at,
            owner_user_id,
            SqlValue::text(&profile.id),
        ],
    )?;
    Ok(changed)
}

/// Deletes a profile. Returns the number of rows removed (0 if absent).
pub fn delete_profile<S: Store>(store: &mut S, id: &str) -> SyncResult<usize> {
    Ok(store.execute("DELETE FROM profiles WHERE id = ?1", &[SqlValue::text(id)])?)
}

/// Counts rows in `profiles`.
pub fn count_profiles<S: Store>(store: &mut S) -> SyncResult<u64> {
    let rows = store.query("SELECT COUNT(*) AS n FROM profiles", &[])?;
    let n = rows.first().map(|r| r.integer("n")).transpose()?.unwrap_or(0);
    Ok(u64::try_from(n).unwrap_or(0))
}
