//! Property-based test generators using proptest.

use crate::fixtures::{base_time, ts};
use profilesync_engine::{Profile, Timestamp};
use proptest::prelude::*;

/// Strategy for profile ids.
pub fn profile_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// Strategy for a profile with the given id.
///
/// Timestamps are whole seconds past [`base_time`].
pub fn profile_with_id(id: String) -> impl Strategy<Value = Profile> {
    (
        proptest::option::of("[a-z]{1,8}@example\\.com"),
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of(prop_oneof![Just("standard"), Just("premium")]),
        0i64..100_000,
    )
        .prop_map(move |(email, username, account_type, updated)| {
            let mut profile = Profile::new(id.clone())
                .with_created_at(base_time())
                .with_updated_at(ts(updated));
            profile.email = email;
            profile.username = username;
            profile.account_type = account_type.map(str::to_string);
            profile
        })
}

/// Strategy for a single random profile.
pub fn profile_strategy() -> impl Strategy<Value = Profile> {
    profile_id_strategy().prop_flat_map(profile_with_id)
}

/// Strategy for `(primary_only, remote_only)` profile sets with no id in
/// common.
pub fn disjoint_profile_sets() -> impl Strategy<Value = (Vec<Profile>, Vec<Profile>)> {
    prop::collection::btree_set(profile_id_strategy(), 0..12)
        .prop_flat_map(|ids| {
            let ids: Vec<String> = ids.into_iter().collect();
            let sides = prop::collection::vec(any::<bool>(), ids.len());
            (Just(ids), sides)
        })
        .prop_flat_map(|(ids, sides)| {
            let profiles: Vec<_> = ids.into_iter().map(profile_with_id).collect();
            (profiles, Just(sides))
        })
        .prop_map(|(profiles, sides)| {
            let (primary, remote): (Vec<_>, Vec<_>) =
                profiles.into_iter().zip(sides).partition(|(_, on_primary)| *on_primary);
            (
                primary.into_iter().map(|(p, _)| p).collect(),
                remote.into_iter().map(|(p, _)| p).collect(),
            )
        })
}

/// Strategy for `(primary, remote)` profile sets that share some ids.
///
/// Shared ids never carry equal `updated_at` values, so which side wins
/// is always decided by recency.
pub fn overlapping_profile_sets() -> impl Strategy<Value = (Vec<Profile>, Vec<Profile>)> {
    (
        disjoint_profile_sets(),
        prop::collection::btree_set("shared-[0-9]{1,3}", 0..6),
    )
        .prop_flat_map(|((primary, remote), shared)| {
            let pairs: Vec<_> = shared
                .into_iter()
                .map(|id| (profile_with_id(id.clone()), profile_with_id(id)))
                .collect();
            (Just(primary), Just(remote), pairs)
        })
        .prop_map(|(mut primary, mut remote, pairs)| {
            for (p, mut r) in pairs {
                if p.updated_at == r.updated_at {
                    r.updated_at = p
                        .updated_instant()
                        .map(|t| Timestamp::from(t + chrono::Duration::seconds(1)));
                }
                primary.push(p);
                remote.push(r);
            }
            (primary, remote)
        })
}
