//! Status command implementation.

use profilesync_engine::{SyncConfig, SyncOrchestrator, SyncStatus};
use serde::Serialize;

/// Status report for both stores.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Primary endpoint.
    pub primary: String,
    /// Remote endpoint.
    pub remote: String,
    /// Unsynchronized change records on the primary.
    pub pending_changes: u64,
    /// Rows in the primary `profiles` table.
    pub primary_profiles: u64,
    /// Rows in the remote `profiles` table.
    pub remote_profiles: u64,
}

impl StatusResult {
    fn new(config: &SyncConfig, status: SyncStatus) -> Self {
        Self {
            primary: config.primary.to_string(),
            remote: config.remote.to_string(),
            pending_changes: status.pending_changes,
            primary_profiles: status.primary_profiles,
            remote_profiles: status.remote_profiles,
        }
    }
}

/// Runs the status command.
pub fn run(config: SyncConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = SyncOrchestrator::sqlite(config);
    let result = StatusResult::new(orchestrator.config(), orchestrator.status()?);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "text" => print_text(&result),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text(result: &StatusResult) {
    println!("profilesync status");
    println!("==================");
    println!();
    println!("Primary: {}", result.primary);
    println!("  Profiles:        {}", result.primary_profiles);
    println!("  Pending changes: {}", result.pending_changes);
    println!();
    println!("Remote:  {}", result.remote);
    println!("  Profiles:        {}", result.remote_profiles);
}
