//! Redis-backed scan queue implementation.
//!
//! Implements the core `ScanQueue` trait by pushing jobs into apalis-redis
//! storage for the scan worker to process.

use std::time::Duration;

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use chrono::Utc;
use kyc_common::{AppError, AppResult};
use kyc_core::ScanQueue;

use crate::jobs::AvScanJob;

/// Redis-backed scan queue.
#[derive(Clone)]
pub struct RedisScanQueue {
    storage: RedisStorage<AvScanJob>,
}

impl RedisScanQueue {
    /// Create a new Redis scan queue.
    #[must_use]
    pub const fn new(storage: RedisStorage<AvScanJob>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ScanQueue for RedisScanQueue {
    async fn enqueue(&self, document_id: &str) -> AppResult<()> {
        self.storage
            .clone()
            .push(AvScanJob::new(document_id))
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue scan job: {e}")))?;

        tracing::debug!(document_id = %document_id, "Queued scan job");
        Ok(())
    }

    async fn schedule_retry(
        &self,
        document_id: &str,
        attempt: u32,
        delay: Duration,
    ) -> AppResult<()> {
        let delay_secs = i64::try_from(delay.as_secs()).unwrap_or(i64::MAX / 2);
        let run_at = Utc::now().timestamp().saturating_add(delay_secs);

        self.storage
            .clone()
            .schedule(AvScanJob::with_attempt(document_id, attempt), run_at)
            .await
            .map_err(|e| AppError::Queue(format!("Failed to schedule scan retry: {e}")))?;

        tracing::debug!(
            document_id = %document_id,
            attempt,
            run_at,
            "Scheduled scan retry"
        );
        Ok(())
    }
}
