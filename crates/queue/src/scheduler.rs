//! Scheduled jobs for periodic maintenance tasks.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kyc_common::{AppResult, KycConfig};
use kyc_core::{AvScanService, PurgeReport, RetentionService};
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Largest number of stale documents listed per report.
const STALE_SCAN_REPORT_LIMIT: u64 = 500;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval of the retention purge (default: daily).
    pub purge_interval: Duration,
    /// Interval of the stale scan report (default: hourly).
    pub stale_scan_interval: Duration,
    /// Age after which a pending scan counts as stale.
    pub stale_scan_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            purge_interval: Duration::from_secs(86400),
            stale_scan_interval: Duration::from_secs(3600),
            stale_scan_minutes: 60,
        }
    }
}

impl SchedulerConfig {
    /// Scheduler settings from the `kyc` config section.
    #[must_use]
    pub fn from_config(config: &KycConfig) -> Self {
        Self {
            purge_interval: Duration::from_secs(config.purge_interval_secs.max(60)),
            stale_scan_minutes: config.stale_scan_minutes,
            ..Self::default()
        }
    }
}

/// Trait for executing scheduled jobs.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Purge documents past their retention date.
    async fn purge_expired(&self) -> AppResult<PurgeReport>;

    /// Log documents still waiting for a scan verdict. Returns their number.
    async fn report_stale_scans(&self, older_than_minutes: i64) -> AppResult<usize>;
}

/// Executor backed by the core retention and scan services.
#[derive(Clone)]
pub struct KycJobExecutor {
    retention: RetentionService,
    scans: AvScanService,
}

impl KycJobExecutor {
    #[must_use]
    pub const fn new(retention: RetentionService, scans: AvScanService) -> Self {
        Self { retention, scans }
    }
}

#[async_trait]
impl JobExecutor for KycJobExecutor {
    async fn purge_expired(&self) -> AppResult<PurgeReport> {
        self.retention.purge(false).await
    }

    async fn report_stale_scans(&self, older_than_minutes: i64) -> AppResult<usize> {
        let stale = self
            .scans
            .find_stale_pending(older_than_minutes, STALE_SCAN_REPORT_LIMIT)
            .await?;

        for document in &stale {
            tracing::warn!(
                target: "kyc::audit",
                document_id = %document.id,
                submission_id = %document.submission_id,
                created_at = %document.created_at,
                "Document still waiting for an antivirus verdict"
            );
        }
        Ok(stale.len())
    }
}

/// Run the scheduler with the given configuration and executor.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: &SchedulerConfig,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>> {
    let executor_purge = executor.clone();
    let executor_stale = executor;

    let purge_interval = config.purge_interval;
    let stale_interval = config.stale_scan_interval;
    let stale_minutes = config.stale_scan_minutes;

    // Spawn retention purge task
    let purge = tokio::spawn(async move {
        let mut interval = interval(purge_interval);
        loop {
            interval.tick().await;
            match executor_purge.purge_expired().await {
                Ok(report) if report.has_errors() => {
                    tracing::error!(summary = %report, "Retention purge finished with errors");
                }
                Ok(report) => {
                    if report.purged_submissions > 0 {
                        tracing::info!(summary = %report, "Retention purge finished");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Retention purge failed");
                }
            }
        }
    });

    // Spawn stale scan report task
    let stale = tokio::spawn(async move {
        let mut interval = interval(stale_interval);
        loop {
            interval.tick().await;
            match executor_stale.report_stale_scans(stale_minutes).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::warn!(count, "Documents waiting for antivirus verdicts");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Stale scan report failed");
                }
            }
        }
    });

    vec![purge, stale]
}
