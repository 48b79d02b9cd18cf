//! Init command implementation.

use profilesync_engine::{SyncConfig, SyncOrchestrator};

/// Creates the sync tables on both stores.
pub fn run(config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = SyncOrchestrator::sqlite(config);
    orchestrator.initialize()?;
    println!("Primary: {}", orchestrator.config().primary);
    println!("Remote:  {}", orchestrator.config().remote);
    println!("Schema ready.");
    Ok(())
}
