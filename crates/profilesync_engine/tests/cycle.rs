//! End-to-end sync cycle tests.

use profilesync_engine::{
    format_timestamp, ChangeOperation, ConfigError, Profile, SqliteConnector, StageOutcome,
    SyncConfig, SyncError, SyncOrchestrator, SyncState, REMOTE_ENDPOINT_VAR,
};
use profilesync_store::{SqlValue, Store};
use profilesync_testkit::prelude::*;
use proptest::prelude::*;

#[test]
fn example_scenario_round_trip() {
    let pair = TestPair::new();
    let orchestrator = pair.orchestrator();

    let p1 = Profile::new("P1").with_email("a@x.com").with_updated_at(ts(0));
    insert_profile(&mut pair.open_primary(), &p1).unwrap();

    let report = orchestrator.run_cycle();
    assert!(report.is_success());
    assert_eq!(report.pushed, 1);
    assert_eq!(pair.remote_profiles(), vec![p1.clone()]);

    let edited = p1.with_email("b@x.com").with_updated_at(ts(1));
    update_profile(&mut pair.open_remote(), &edited).unwrap();

    let report = orchestrator.run_cycle();
    assert!(report.is_success());
    assert_eq!(report.diffed, 1);
    let stored = find_profile(&mut pair.open_primary(), "P1").unwrap().unwrap();
    assert_eq!(stored.email.as_deref(), Some("b@x.com"));
}

#[test]
fn quiet_cycle_reports_in_sync() {
    let pair = TestPair::new();
    let orchestrator = pair.orchestrator();
    insert_profile(&mut pair.open_primary(), &sample_profile("p1", 0)).unwrap();
    insert_profile(&mut pair.open_remote(), &sample_profile("r1", 0)).unwrap();

    let first = orchestrator.run_cycle();
    assert_eq!(first.summary(), "processed 2 change(s)");

    // The diff's insert of r1 was changelogged and is echoed back once.
    let second = orchestrator.run_cycle();
    assert_eq!(second.pushed, 1);
    assert_eq!(second.diffed, 0);

    let third = orchestrator.run_cycle();
    assert_eq!(third.total(), 0);
    assert_eq!(third.summary(), "in sync");
    assert_eq!(orchestrator.stats().cycles_completed, 3);
    assert_eq!(orchestrator.state(), SyncState::Synced);
}

#[test]
fn provisioning_creates_the_remote_table() {
    let pair = TestPair::bare();
    {
        let mut primary = pair.open_primary();
        profilesync_engine::ensure_primary_schema(&mut primary).unwrap();
    }

    let report = pair.orchestrator().run_cycle();
    assert!(report.is_success(), "{:?}", report.failures());
    assert!(pair.remote_profiles().is_empty());
}

#[test]
fn provisioning_failure_aborts_the_cycle() {
    let pair = TestPair::new();
    insert_profile(&mut pair.open_primary(), &sample_profile("p1", 0)).unwrap();

    let plan = FaultPlan::new();
    plan.fail_statement(FaultRule::new("CREATE TABLE IF NOT EXISTS profiles"));
    let connector = FaultyConnector::new(SqliteConnector::new(), pair.remote.clone(), plan);
    let orchestrator = SyncOrchestrator::new(pair.config(), connector);

    let report = orchestrator.run_cycle();
    assert!(report.provision.error().is_some());
    assert!(matches!(report.push, StageOutcome::NotRun));
    assert!(matches!(report.diff, StageOutcome::NotRun));
    assert_eq!(orchestrator.state(), SyncState::Error);
    assert_eq!(pair.pending_changes(), 1);
}

#[test]
fn unreachable_remote_is_reported_not_raised() {
    let pair = TestPair::new();
    let plan = FaultPlan::new();
    plan.set_fail_connect(true);
    let connector = FaultyConnector::new(SqliteConnector::new(), pair.remote.clone(), plan.clone());
    let orchestrator = SyncOrchestrator::new(pair.config(), connector);

    let report = orchestrator.run_cycle();
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].1, SyncError::Store(_)));
    assert_eq!(orchestrator.stats().cycles_failed, 1);

    // Recovers on the next scheduled cycle.
    plan.reset();
    assert!(orchestrator.run_cycle().is_success());
    assert_eq!(orchestrator.state(), SyncState::Synced);
}

#[test]
fn record_failure_without_guard_tombstones_unpushed_row() {
    let pair = TestPair::new();
    insert_profile(&mut pair.open_primary(), &sample_profile("local", 0)).unwrap();

    let plan = FaultPlan::new();
    plan.fail_statement(FaultRule::new("INSERT INTO profiles"));
    let connector = FaultyConnector::new(SqliteConnector::new(), pair.remote.clone(), plan.clone());
    let orchestrator = SyncOrchestrator::new(pair.config(), connector);

    let report = orchestrator.run_cycle();
    assert!(report.push.completed().is_some());
    assert_eq!(report.pushed, 0);
    assert_eq!(report.record_failures(), 1);
    // The push stage itself succeeded, so the diff ran and saw a row the
    // remote does not have.
    assert_eq!(report.diffed, 1);
    assert!(find_profile(&mut pair.open_primary(), "local").unwrap().is_none());

    // Both the insert and the diff's delete replay, leaving the pair empty.
    plan.reset();
    orchestrator.run_cycle();
    assert!(pair.remote_profiles().is_empty());
    assert!(pair.primary_profiles().is_empty());
}

#[test]
fn tombstone_guard_keeps_unpushed_row() {
    let pair = TestPair::new();
    insert_profile(&mut pair.open_primary(), &sample_profile("local", 0)).unwrap();

    let plan = FaultPlan::new();
    plan.fail_statement(FaultRule::new("INSERT INTO profiles"));
    let connector = FaultyConnector::new(SqliteConnector::new(), pair.remote.clone(), plan.clone());
    let orchestrator = SyncOrchestrator::new(pair.config().with_tombstone_guard(true), connector);

    let report = orchestrator.run_cycle();
    assert_eq!(report.record_failures(), 1);
    assert_eq!(report.diffed, 0);
    assert!(find_profile(&mut pair.open_primary(), "local").unwrap().is_some());

    plan.reset();
    let report = orchestrator.run_cycle();
    assert_eq!(report.pushed, 1);
    assert_eq!(pair.remote_profiles(), pair.primary_profiles());
}

#[test]
fn stage_failure_on_push_leaves_local_rows_alone() {
    let pair = TestPair::new();
    insert_profile(&mut pair.open_primary(), &sample_profile("local", 0)).unwrap();
    insert_profile(&mut pair.open_remote(), &sample_profile("remote_new", 0)).unwrap();

    let plan = FaultPlan::new();
    // Provisioning never reads `change_log`; the push does, first thing.
    plan.fail_statement(FaultRule::new("FROM change_log WHERE synchronized = 0"));
    let connector = FaultyConnector::new(SqliteConnector::new(), pair.primary.clone(), plan);
    let orchestrator = SyncOrchestrator::new(pair.config(), connector);

    let report = orchestrator.run_cycle();
    assert!(report.provision.completed().is_some());
    assert!(report.push.error().is_some());
    // The other direction still runs, minus its deletion pass.
    assert!(report.diff.completed().is_some());
    assert_eq!(report.diffed, 1);
    assert!(find_profile(&mut pair.open_primary(), "local").unwrap().is_some());
    assert!(find_profile(&mut pair.open_primary(), "remote_new").unwrap().is_some());
}

#[test]
fn undecodable_change_record_does_not_stall_sync() {
    let pair = TestPair::untracked();
    {
        let mut primary = pair.open_primary();
        primary
            .execute(
                "INSERT INTO change_log (profile_id, operation, email, occurred_at)
                 VALUES ('broken', 'INSERT', X'00FF', ?1)",
                &[SqlValue::text(format_timestamp(ts(0)))],
            )
            .unwrap();
        let good = sample_profile("good", 0);
        insert_profile(&mut primary, &good).unwrap();
        append_change(&mut primary, ChangeOperation::Insert, &good, ts(1)).unwrap();
    }
    insert_profile(&mut pair.open_remote(), &sample_profile("remote_new", 0)).unwrap();

    let orchestrator = pair.orchestrator();
    for _ in 0..2 {
        let report = orchestrator.run_cycle();
        assert!(report.is_success(), "{:?}", report.failures());
        assert_eq!(report.record_failures(), 1);
    }

    let ids = |profiles: Vec<Profile>| profiles.into_iter().map(|p| p.id).collect::<Vec<_>>();
    assert_eq!(ids(pair.remote_profiles()), vec!["good", "remote_new"]);
    assert_eq!(ids(pair.primary_profiles()), vec!["good", "remote_new"]);
    assert_eq!(pair.pending_changes(), 1);
}

#[test]
fn missing_remote_endpoint_is_fatal() {
    let err = SyncConfig::from_lookup(|var| {
        (var != REMOTE_ENDPOINT_VAR).then(|| "primary.db".to_string())
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingRemoteEndpoint { .. }));
}

#[test]
fn status_and_initialize() {
    let pair = TestPair::bare();
    let orchestrator = pair.orchestrator();
    orchestrator.initialize().unwrap();
    orchestrator.initialize().unwrap();

    install_changelog_triggers(&mut pair.open_primary()).unwrap();
    insert_profile(&mut pair.open_primary(), &sample_profile("p1", 0)).unwrap();

    let status = orchestrator.status().unwrap();
    assert_eq!(status.pending_changes, 1);
    assert_eq!(status.primary_profiles, 1);
    assert_eq!(status.remote_profiles, 0);
    assert_eq!(orchestrator.pending_changes().unwrap().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn one_cycle_converges((primary_rows, remote_rows) in overlapping_profile_sets()) {
        let pair = TestPair::new();
        {
            let mut primary = pair.open_primary();
            for p in &primary_rows {
                insert_profile(&mut primary, p).unwrap();
            }
            let mut remote = pair.open_remote();
            for r in &remote_rows {
                insert_profile(&mut remote, r).unwrap();
            }
        }

        let orchestrator = pair.orchestrator();
        let report = orchestrator.run_cycle();
        prop_assert!(report.is_success());
        prop_assert_eq!(pair.primary_profiles(), pair.remote_profiles());

        orchestrator.run_cycle();
        let report = orchestrator.run_cycle();
        prop_assert_eq!(report.total(), 0);
        prop_assert_eq!(pair.primary_profiles(), pair.remote_profiles());
    }
}
