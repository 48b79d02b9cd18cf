//! Last-writer-wins conflict resolution.
//!
//! The only policy in scope compares `updated_at`. A remote row replaces
//! the primary row only when it is strictly newer. Equal timestamps keep
//! the primary, which assumes both writers' clocks agree; with skewed
//! clocks a genuinely later write on the slower side can lose.

use crate::model::Profile;
use chrono::{DateTime, Utc};

/// Outcome of comparing a primary row with its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Remote is strictly newer; overwrite the primary.
    AcceptRemote,
    /// Primary is newer or equally recent; leave it.
    KeepPrimary,
    /// At least one side has no timestamp; recency cannot be judged.
    Undecidable,
}

/// Resolves by modification time.
pub fn resolve(
    primary_updated_at: Option<DateTime<Utc>>,
    remote_updated_at: Option<DateTime<Utc>>,
) -> Resolution {
    match (primary_updated_at, remote_updated_at) {
        (Some(primary), Some(remote)) if remote > primary => Resolution::AcceptRemote,
        (Some(_), Some(_)) => Resolution::KeepPrimary,
        _ => Resolution::Undecidable,
    }
}

/// Resolves a pair of rows sharing an id.
pub fn resolve_profiles(primary: &Profile, remote: &Profile) -> Resolution {
    debug_assert_eq!(primary.id, remote.id);
    resolve(primary.updated_instant(), remote.updated_instant())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn newer_remote_wins() {
        assert_eq!(resolve(Some(t(0)), Some(t(1))), Resolution::AcceptRemote);
    }

    #[test]
    fn ties_and_older_keep_primary() {
        assert_eq!(resolve(Some(t(0)), Some(t(0))), Resolution::KeepPrimary);
        assert_eq!(resolve(Some(t(5)), Some(t(1))), Resolution::KeepPrimary);
    }

    #[test]
    fn missing_timestamps_are_undecidable() {
        assert_eq!(resolve(None, Some(t(1))), Resolution::Undecidable);
        assert_eq!(resolve(Some(t(1)), None), Resolution::Undecidable);
        assert_eq!(resolve(None, None), Resolution::Undecidable);
    }

    #[test]
    fn resolve_profiles_uses_updated_at() {
        let primary = Profile::new("p1").with_updated_at(t(0)).with_email("a@x.com");
        let remote = Profile::new("p1").with_updated_at(t(10)).with_email("b@x.com");
        assert_eq!(resolve_profiles(&primary, &remote), Resolution::AcceptRemote);
        assert_eq!(resolve_profiles(&remote, &primary), Resolution::KeepPrimary);
    }
}
