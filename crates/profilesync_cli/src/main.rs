//! profilesync CLI
//!
//! Command-line driver for the profilesync engine.
//!
//! # Commands
//!
//! - `run` - Run one sync cycle (provision, push, diff)
//! - `status` - Show pending change records and row counts
//! - `init` - Create the sync tables on both stores
//! - `pending` - List pending change records
//!
//! `run` performs exactly one cycle. Periodic sync is left to an external
//! scheduler (cron, a systemd timer), which must not start a cycle while
//! the previous one is still running.

mod commands;

use clap::{Parser, Subcommand};
use profilesync_engine::{
    SyncConfig, DEFAULT_SNAPSHOT_WARN_ROWS, PRIMARY_ENDPOINT_VAR, REMOTE_ENDPOINT_VAR,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Keeps a profile table in sync between a primary and a remote store.
#[derive(Parser)]
#[command(name = "profilesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Primary store endpoint: `sqlite://<path>`, a file path, or `sqlite::memory:`
    #[arg(global = true, long, env = PRIMARY_ENDPOINT_VAR, hide_env_values = true)]
    primary: Option<String>,

    /// Remote store endpoint, SQLite only. A `postgres://` URL left over
    /// from an older deployment is rejected; point this at a SQLite file.
    #[arg(global = true, long, env = REMOTE_ENDPOINT_VAR, hide_env_values = true)]
    remote: Option<String>,

    /// How long a statement waits on a locked database, in milliseconds
    #[arg(global = true, long, default_value = "5000")]
    busy_timeout_ms: u64,

    /// Snapshot size above which the diff logs a scaling warning
    #[arg(global = true, long, default_value_t = DEFAULT_SNAPSHOT_WARN_ROWS)]
    snapshot_warn_rows: usize,

    /// Never tombstone-delete rows that still have pending local changes
    #[arg(global = true, long)]
    tombstone_guard: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle
    Run,

    /// Show pending change records and row counts
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create `profiles` and `change_log` on the primary and `profiles` on the remote
    Init,

    /// List pending change records in replay order
    Pending {
        /// Maximum number of records to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    /// Builds the engine configuration. A missing remote endpoint is
    /// reported first.
    fn config(&self) -> Result<SyncConfig, profilesync_engine::ConfigError> {
        let config = SyncConfig::from_lookup(|var| match var {
            PRIMARY_ENDPOINT_VAR => self.primary.clone(),
            REMOTE_ENDPOINT_VAR => self.remote.clone(),
            _ => None,
        })?;
        Ok(config
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .with_snapshot_warn_rows(self.snapshot_warn_rows)
            .with_tombstone_guard(self.tombstone_guard))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run => commands::run::run(cli.config()?)?,
        Commands::Status { format } => commands::status::run(cli.config()?, format)?,
        Commands::Init => commands::init::run(cli.config()?)?,
        Commands::Pending { limit, format } => {
            commands::pending::run(cli.config()?, *limit, format)?
        }
        Commands::Version => {
            println!("profilesync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use profilesync_engine::{ConfigError, Endpoint};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::try_parse_from([
            "profilesync",
            "--primary",
            "sqlite:///tmp/primary.db",
            "--remote",
            "/tmp/remote.db",
            "--tombstone-guard",
            "run",
        ])
        .unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.primary, Endpoint::sqlite("/tmp/primary.db"));
        assert_eq!(config.remote, Endpoint::sqlite("/tmp/remote.db"));
        assert!(config.tombstone_guard);
        assert_eq!(config.busy_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn missing_remote_is_an_error() {
        let mut cli = Cli::try_parse_from(["profilesync", "--primary", "p.db", "run"]).unwrap();
        // The environment may carry a value; the flag layer is what is tested.
        cli.remote = None;
        assert!(matches!(
            cli.config(),
            Err(ConfigError::MissingRemoteEndpoint { .. })
        ));
    }
}
