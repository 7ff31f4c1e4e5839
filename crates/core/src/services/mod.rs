//! Business logic services.

#![allow(missing_docs)]

pub mod av_scan;
pub mod kyc_intake;
pub mod kyc_review;
pub mod kyc_view;
pub mod magic;
pub mod quarantine;
pub mod retention;
pub mod scan_queue;
pub mod scanner;

pub use av_scan::{AvScanService, ScanOutcome, SkipReason};
pub use kyc_intake::{KycIntakeService, UploadedDocument};
pub use kyc_review::{KycReviewService, KycStatusView};
pub use kyc_view::{DocumentView, SubmissionView, SubmissionViewLoader, UserVerification};
pub use magic::{MagicByteValidator, SniffedType, sniff};
pub use quarantine::QuarantineManager;
pub use retention::{
    PurgeCandidate, PurgeFailure, PurgeReport, PurgeRowFailure, RetentionService,
};
pub use scan_queue::{NoOpScanQueue, ScanQueue, ScanQueueService};
pub use scanner::{ClamScanner, ScanVerdict, VirusScanner};
