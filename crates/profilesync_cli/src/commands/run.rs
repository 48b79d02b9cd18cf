//! Run command implementation.

use profilesync_engine::{SyncConfig, SyncOrchestrator};

/// Runs one sync cycle and prints its summary.
///
/// Stage failures are printed but do not fail the command: the next
/// scheduled invocation retries them.
pub fn run(config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = SyncOrchestrator::sqlite(config);
    let report = orchestrator.run_cycle();

    for (stage, error) in report.failures() {
        eprintln!("{stage} failed: {error}");
    }
    if report.record_failures() > 0 {
        eprintln!(
            "{} record(s) failed and will be retried",
            report.record_failures()
        );
    }
    println!(
        "Sync {}: {} ({} pushed, {} pulled in {:?})",
        if report.is_success() { "complete" } else { "incomplete" },
        report.summary(),
        report.pushed,
        report.diffed,
        report.duration
    );
    Ok(())
}
