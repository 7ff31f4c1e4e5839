//! Command line interface.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "kyc",
    about = "Identity document intake, antivirus scanning and retention",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service, the scan worker and the scheduler (default command)
    Serve(ServeArgs),
    /// Apply pending database migrations
    Migrate,
    /// Delete documents whose retention period has passed
    Purge(PurgeArgs),
    /// List documents still waiting for an antivirus verdict
    StaleScans(StaleScansArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub port: Option<u16>,
    /// Serve HTTP only; scans and scheduled tasks run elsewhere
    #[arg(long)]
    pub no_worker: bool,
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Report what would be deleted without deleting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct StaleScansArgs {
    /// Minimum age in minutes (defaults to `kyc.stale_scan_minutes`)
    #[arg(long)]
    pub minutes: Option<i64>,
    /// Maximum number of documents to list
    #[arg(long, default_value_t = 500)]
    pub limit: u64,
    /// Queue a fresh scan job for every listed document
    #[arg(long)]
    pub requeue: bool,
}
