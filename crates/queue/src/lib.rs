//! Background job queue for kyc-vault.
//!
//! This crate provides asynchronous job processing using Redis:
//!
//! - **Jobs**: Antivirus scans of uploaded documents
//! - **Workers**: Concurrent scan execution with Apalis
//! - **Retry**: Attempt-numbered retries with a fixed backoff
//! - **Scheduler**: Periodic tasks (retention purge, stale scan report)

pub mod jobs;
pub mod retry;
pub mod scan_queue_impl;
pub mod scheduler;
pub mod workers;

pub use jobs::*;
pub use retry::RetryConfig;
pub use scan_queue_impl::RedisScanQueue;
pub use scheduler::{JobExecutor, KycJobExecutor, SchedulerConfig, run_scheduler};
pub use workers::*;
