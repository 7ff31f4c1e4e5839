//! Antivirus scan queue abstraction.
//!
//! Core services enqueue scan work through this trait; the Redis-backed
//! implementation lives in the queue crate.

use async_trait::async_trait;
use kyc_common::AppResult;
use std::sync::Arc;
use std::time::Duration;

/// Trait for queueing antivirus scans of stored documents.
#[async_trait]
pub trait ScanQueue: Send + Sync {
    /// Queue the first scan attempt for a document.
    async fn enqueue(&self, document_id: &str) -> AppResult<()>;

    /// Queue attempt number `attempt` for a document after `delay`.
    async fn schedule_retry(&self, document_id: &str, attempt: u32, delay: Duration)
    -> AppResult<()>;
}

/// A no-op implementation of `ScanQueue` for tests or when scanning runs elsewhere.
#[derive(Clone, Default)]
pub struct NoOpScanQueue;

#[async_trait]
impl ScanQueue for NoOpScanQueue {
    async fn enqueue(&self, _document_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn schedule_retry(
        &self,
        _document_id: &str,
        _attempt: u32,
        _delay: Duration,
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `ScanQueue` trait object.
pub type ScanQueueService = Arc<dyn ScanQueue>;
