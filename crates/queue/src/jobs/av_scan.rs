//! Antivirus scan job.

use serde::{Deserialize, Serialize};

/// Job to scan one stored KYC document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvScanJob {
    /// The document to scan.
    pub document_id: String,

    /// Delivery attempt, starting at 1.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

const fn first_attempt() -> u32 {
    1
}

impl AvScanJob {
    /// Create the first attempt for a document.
    #[must_use]
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            attempt: first_attempt(),
        }
    }

    /// The job for attempt number `attempt`.
    #[must_use]
    pub fn with_attempt(document_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            document_id: document_id.into(),
            attempt,
        }
    }
}
