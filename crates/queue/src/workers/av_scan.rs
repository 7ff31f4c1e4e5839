//! Antivirus scan worker.

use apalis::prelude::*;
use kyc_common::{AppError, AppResult};
use kyc_core::{AvScanService, ScanOutcome, ScanQueueService};
use tracing::{error, info, warn};

use crate::jobs::AvScanJob;
use crate::retry::RetryConfig;

/// Context for the scan worker.
#[derive(Clone)]
pub struct AvScanContext {
    pub scan_service: AvScanService,
    /// Used to schedule the next attempt.
    pub queue: ScanQueueService,
    pub retry: RetryConfig,
}

impl AvScanContext {
    /// Create a new scan context.
    #[must_use]
    pub const fn new(
        scan_service: AvScanService,
        queue: ScanQueueService,
        retry: RetryConfig,
    ) -> Self {
        Self {
            scan_service,
            queue,
            retry,
        }
    }
}

/// What one run of a scan job led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanJobResult {
    /// The scan ran to an outcome.
    Completed(ScanOutcome),
    /// The scan failed and the next attempt was scheduled.
    Rescheduled { next_attempt: u32 },
}

/// Worker function for scanning documents.
///
/// # Errors
/// Returns an error when the last attempt failed or the retry could not be
/// scheduled.
pub async fn av_scan_worker(job: AvScanJob, ctx: Data<AvScanContext>) -> Result<(), Error> {
    info!(
        document_id = %job.document_id,
        attempt = job.attempt,
        "Scanning document"
    );

    match handle_scan_job(&job, &ctx).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!(document_id = %job.document_id, error = %e, "Scan job failed");
            let e: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
            Err(Error::Failed(e.into()))
        }
    }
}

/// Run one scan attempt, scheduling a retry when no verdict could be written.
///
/// Scanner failures are verdicts and never retried. On the last attempt the
/// document gets a best-effort `error` verdict before the failure is returned.
pub async fn handle_scan_job(job: &AvScanJob, ctx: &AvScanContext) -> AppResult<ScanJobResult> {
    let cause = match ctx.scan_service.scan_document(&job.document_id).await {
        Ok(outcome) => {
            info!(
                document_id = %job.document_id,
                outcome = ?outcome,
                "Scan job completed"
            );
            return Ok(ScanJobResult::Completed(outcome));
        }
        Err(e) => e,
    };

    if ctx.retry.should_retry(job.attempt) {
        let next_attempt = job.attempt + 1;
        ctx.queue
            .schedule_retry(
                &job.document_id,
                next_attempt,
                ctx.retry.delay_after(job.attempt),
            )
            .await?;

        warn!(
            document_id = %job.document_id,
            attempt = job.attempt,
            next_attempt,
            error = %cause,
            "Scan attempt failed, retry scheduled"
        );
        return Ok(ScanJobResult::Rescheduled { next_attempt });
    }

    if let Err(e) = ctx
        .scan_service
        .abandon(&job.document_id, job.attempt, &cause.to_string())
        .await
    {
        // The stale scan report lists documents left pending here.
        error!(
            document_id = %job.document_id,
            error = %e,
            "Failed to record abandoned scan, document stays pending"
        );
    }

    Err(AppError::Queue(format!(
        "scan of {} failed after {} attempts: {cause}",
        job.document_id, job.attempt
    )))
}
