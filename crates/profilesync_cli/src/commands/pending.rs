//! Pending command implementation.

use profilesync_engine::{format_timestamp, ChangeRecord, SyncConfig, SyncOrchestrator};

/// Lists pending change records in replay order.
pub fn run(
    config: SyncConfig,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = SyncOrchestrator::sqlite(config);
    let mut records = orchestrator.pending_changes()?;
    let total = records.len();
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        "text" => {
            for record in &records {
                println!("{}", format_record(record));
            }
            if records.len() < total {
                println!("... {} more", total - records.len());
            }
            println!("{total} pending change record(s)");
        }
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn format_record(record: &ChangeRecord) -> String {
    let occurred = record
        .occurred_at
        .map(format_timestamp)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<6} {:<7} {:<24} {} {}",
        record.id,
        record.operation.as_str(),
        record.profile_id,
        occurred,
        record.snapshot.email.as_deref().unwrap_or("")
    )
}
