//! kyc-vault server entry point.

mod cli;
mod serve;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use apalis_redis::RedisStorage;
use clap::Parser;
use kyc_common::{Config, StorageManager};
use kyc_core::{AvScanService, ClamScanner, RetentionService, ScanQueue};
use kyc_queue::{AvScanJob, RedisScanQueue};
use sea_orm::DatabaseConnection;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, ServeArgs, StaleScansArgs};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kyc=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve::run(config, args).await.map(|()| ExitCode::SUCCESS),
        Command::Migrate => migrate(&config).await,
        Command::Purge(args) => purge(&config, args.dry_run).await,
        Command::StaleScans(args) => stale_scans(&config, args).await,
    }
}

/// Connect to the configured database.
pub(crate) async fn connect_database(config: &Config) -> anyhow::Result<DatabaseConnection> {
    let db = kyc_db::init(config)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");
    Ok(db)
}

/// Scan job storage on the configured Redis, namespaced by `redis.prefix`.
pub(crate) async fn scan_storage(config: &Config) -> anyhow::Result<RedisStorage<AvScanJob>> {
    let client = redis::Client::open(config.redis.url.as_str()).context("invalid Redis URL")?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;
    let queue_config =
        apalis_redis::Config::default().set_namespace(&format!("{}av_scan", config.redis.prefix));
    Ok(RedisStorage::new_with_config(conn, queue_config))
}

/// Storage disks from the configuration.
pub(crate) fn storage_manager(config: &Config) -> anyhow::Result<Arc<StorageManager>> {
    let storage =
        StorageManager::from_settings(&config.storage).context("invalid storage configuration")?;
    Ok(Arc::new(storage))
}

async fn migrate(config: &Config) -> anyhow::Result<ExitCode> {
    let db = connect_database(config).await?;
    kyc_db::migrate(&db).await?;
    info!("Migrations completed");
    Ok(ExitCode::SUCCESS)
}

/// Run the retention purge once and print its summary line.
///
/// Exits with 1 when a real run failed to delete any file or row.
async fn purge(config: &Config, dry_run: bool) -> anyhow::Result<ExitCode> {
    let db = Arc::new(connect_database(config).await?);
    let retention = RetentionService::new(db, storage_manager(config)?, &config.kyc);

    let report = retention.purge(dry_run).await?;
    println!("{report}");

    for failure in &report.failures {
        warn!(
            submission_id = %failure.submission_id,
            document_id = %failure.document_id,
            path = %failure.path,
            error = %failure.error,
            "File could not be deleted"
        );
    }
    for failure in &report.row_failures {
        warn!(
            submission_id = %failure.submission_id,
            error = %failure.error,
            "Document rows could not be deleted"
        );
    }

    if report.has_errors() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// List documents pending longer than the threshold, optionally queueing
/// them for another scan.
async fn stale_scans(config: &Config, args: StaleScansArgs) -> anyhow::Result<ExitCode> {
    let db = Arc::new(connect_database(config).await?);
    let scans = AvScanService::new(
        db,
        storage_manager(config)?,
        Arc::new(ClamScanner::from_config(&config.kyc)),
        &config.kyc,
    );

    let minutes = args.minutes.unwrap_or(config.kyc.stale_scan_minutes);
    let stale = scans.find_stale_pending(minutes, args.limit).await?;

    for document in &stale {
        println!(
            "{}\t{}\t{}\t{}",
            document.id,
            document.submission_id,
            document.doc_type.as_str(),
            document.created_at.to_rfc3339()
        );
    }
    println!("{} documents pending for more than {minutes} minutes", stale.len());

    if args.requeue && !stale.is_empty() {
        let queue = RedisScanQueue::new(scan_storage(config).await?);
        for document in &stale {
            queue.enqueue(&document.id).await?;
        }
        info!(count = stale.len(), "Requeued stale scans");
    }

    Ok(ExitCode::SUCCESS)
}
