//! Antivirus scanning of stored KYC documents.
//!
//! Drives the document status (`pending` to `clean`, `infected` or `error`)
//! and, for infected files, quarantines the bytes and forces the owning
//! submission out of `pending`. Every status write is conditional on the
//! document still being `pending`, so duplicate deliveries of the same scan
//! job cannot overwrite a recorded verdict.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use kyc_common::{AppError, AppResult, KycConfig, StorageBackend, StorageManager};
use kyc_db::{
    entities::{
        KycDocument, KycSubmission,
        kyc_document::{self, AvStatus},
        kyc_submission::{self, SubmissionEvent, SubmissionStatus},
    },
    repositories::KycDocumentRepository,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use super::quarantine::QuarantineManager;
use super::scanner::{ScanVerdict, VirusScanner};

/// Result of one scan job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A verdict was written.
    Recorded(AvStatus),
    /// Nothing was written.
    Skipped(SkipReason),
}

/// Why a scan run wrote nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Scanning is disabled by configuration.
    Disabled,
    /// The document row no longer exists.
    NotFound,
    /// The document already has a verdict.
    AlreadyScanned,
    /// Another delivery recorded a verdict while this one was scanning.
    Concurrent,
}

/// Where the bytes to scan live.
enum Location {
    Local {
        disk: Arc<dyn StorageBackend>,
        path: String,
        file: PathBuf,
    },
    Unavailable(String),
}

/// Antivirus scan service.
#[derive(Clone)]
pub struct AvScanService {
    db: Arc<DatabaseConnection>,
    document_repo: KycDocumentRepository,
    storage: Arc<StorageManager>,
    scanner: Arc<dyn VirusScanner>,
    quarantine: QuarantineManager,
    enabled: bool,
}

impl AvScanService {
    /// Create a new scan service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: Arc<StorageManager>,
        scanner: Arc<dyn VirusScanner>,
        config: &KycConfig,
    ) -> Self {
        Self {
            document_repo: KycDocumentRepository::new(db.clone()),
            db,
            storage,
            scanner,
            quarantine: QuarantineManager::new(&config.quarantine_prefix),
            enabled: config.av_scan_enabled,
        }
    }

    /// Scan one document and record the verdict.
    ///
    /// Scanner failures are recorded as `error` verdicts. An `Err` means no
    /// verdict could be written (database or storage unavailable) and the
    /// job should be retried.
    pub async fn scan_document(&self, document_id: &str) -> AppResult<ScanOutcome> {
        if !self.enabled {
            tracing::warn!(
                document_id = %document_id,
                "Antivirus scanning is disabled, document stays pending"
            );
            return Ok(ScanOutcome::Skipped(SkipReason::Disabled));
        }

        let Some(document) = self.document_repo.find_by_id(document_id).await? else {
            tracing::debug!(document_id = %document_id, "Scanned document no longer exists");
            return Ok(ScanOutcome::Skipped(SkipReason::NotFound));
        };

        if document.av_status.is_final() {
            tracing::debug!(
                document_id = %document_id,
                av_status = document.av_status.as_str(),
                "Document already scanned"
            );
            return Ok(ScanOutcome::Skipped(SkipReason::AlreadyScanned));
        }

        let (disk, path, file) = match self.locate(&document).await? {
            Location::Local { disk, path, file } => (disk, path, file),
            Location::Unavailable(cause) => return self.record_error(&document, &cause).await,
        };

        match self.scanner.scan(&file).await {
            ScanVerdict::Clean => self.record_clean(&document).await,
            ScanVerdict::Infected { threat } => {
                self.record_infected(&document, disk.as_ref(), &path, &threat)
                    .await
            }
            ScanVerdict::Error { message } => self.record_error(&document, &message).await,
        }
    }

    /// Record an `error` verdict after the scan job ran out of attempts.
    ///
    /// Returns whether the document was still pending.
    pub async fn abandon(&self, document_id: &str, attempts: u32, cause: &str) -> AppResult<bool> {
        let message = format!("scan abandoned after {attempts} attempts: {cause}");
        let written = write_verdict(
            self.db.as_ref(),
            document_id,
            AvStatus::Error,
            None,
            Some(message.clone()),
        )
        .await?;

        if written {
            tracing::error!(
                target: "kyc::audit",
                document_id = %document_id,
                attempts,
                error = %cause,
                "Antivirus scan abandoned"
            );
        }
        Ok(written)
    }

    /// Documents still pending `older_than_minutes` after upload.
    pub async fn find_stale_pending(
        &self,
        older_than_minutes: i64,
        limit: u64,
    ) -> AppResult<Vec<kyc_document::Model>> {
        let cutoff = Utc::now() - Duration::minutes(older_than_minutes);
        self.document_repo.find_stale_pending(cutoff, limit).await
    }

    async fn locate(&self, document: &kyc_document::Model) -> AppResult<Location> {
        let Ok(disk) = self.storage.disk(&document.disk) else {
            return Ok(Location::Unavailable(format!(
                "unknown storage disk: {}",
                document.disk
            )));
        };

        // An earlier attempt may have quarantined the file before its
        // verdict write failed.
        let quarantined = self.quarantine.quarantine_path(&document.path);
        let path = if disk.exists(&document.path).await? {
            document.path.clone()
        } else if quarantined != document.path && disk.exists(&quarantined).await? {
            quarantined
        } else {
            return Ok(Location::Unavailable(format!(
                "file not found on disk {}: {}",
                document.disk, document.path
            )));
        };

        match disk.local_path(&path) {
            Some(file) => Ok(Location::Local { disk, path, file }),
            None => Ok(Location::Unavailable(format!(
                "disk {} is not locally addressable",
                document.disk
            ))),
        }
    }

    async fn record_clean(&self, document: &kyc_document::Model) -> AppResult<ScanOutcome> {
        if !write_verdict(self.db.as_ref(), &document.id, AvStatus::Clean, None, None).await? {
            return Ok(ScanOutcome::Skipped(SkipReason::Concurrent));
        }

        tracing::info!(
            target: "kyc::audit",
            document_id = %document.id,
            submission_id = %document.submission_id,
            verdict = "clean",
            "Antivirus scan completed"
        );
        Ok(ScanOutcome::Recorded(AvStatus::Clean))
    }

    async fn record_error(
        &self,
        document: &kyc_document::Model,
        cause: &str,
    ) -> AppResult<ScanOutcome> {
        let written = write_verdict(
            self.db.as_ref(),
            &document.id,
            AvStatus::Error,
            None,
            Some(cause.to_string()),
        )
        .await?;
        if !written {
            return Ok(ScanOutcome::Skipped(SkipReason::Concurrent));
        }

        tracing::warn!(
            target: "kyc::audit",
            document_id = %document.id,
            submission_id = %document.submission_id,
            verdict = "error",
            error = %cause,
            "Antivirus scan failed"
        );
        Ok(ScanOutcome::Recorded(AvStatus::Error))
    }

    async fn record_infected(
        &self,
        document: &kyc_document::Model,
        disk: &dyn StorageBackend,
        path: &str,
        threat: &str,
    ) -> AppResult<ScanOutcome> {
        let Some(cascade_status) = SubmissionStatus::Pending.apply(SubmissionEvent::Quarantine)
        else {
            return Err(AppError::Internal(
                "pending submissions cannot be quarantined".to_string(),
            ));
        };

        let stored_path = self.quarantine.isolate(disk, &document.id, path).await;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let written = write_verdict(
            &txn,
            &document.id,
            AvStatus::Infected,
            Some(stored_path.clone()),
            Some(threat.to_string()),
        )
        .await?;
        if !written {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(ScanOutcome::Skipped(SkipReason::Concurrent));
        }

        let note = format!(
            "Quarantined by antivirus scan: {} matched {threat}",
            document.doc_type.as_str()
        );
        // The pending guard in the UPDATE keeps reviewed submissions as they are.
        let cascaded = KycSubmission::update_many()
            .set(kyc_submission::ActiveModel {
                status: Set(cascade_status),
                reviewed_at: Set(Some(Utc::now().into())),
                reviewer_note: Set(Some(note)),
                ..Default::default()
            })
            .filter(kyc_submission::Column::Id.eq(document.submission_id.as_str()))
            .filter(kyc_submission::Column::Status.eq(SubmissionStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::error!(
            target: "kyc::audit",
            document_id = %document.id,
            submission_id = %document.submission_id,
            verdict = "infected",
            threat = %threat,
            path = %stored_path,
            quarantined = self.quarantine.is_quarantined(&stored_path),
            submission_quarantined = cascaded.rows_affected > 0,
            "Antivirus scan found an infected document"
        );
        Ok(ScanOutcome::Recorded(AvStatus::Infected))
    }
}

/// Write a verdict if the document is still pending. Returns whether a row
/// was updated.
async fn write_verdict<C: ConnectionTrait>(
    db: &C,
    document_id: &str,
    verdict: AvStatus,
    path: Option<String>,
    message: Option<String>,
) -> AppResult<bool> {
    let Some(status) = AvStatus::Pending.record(verdict) else {
        return Err(AppError::Internal(format!(
            "{} is not a scan verdict",
            verdict.as_str()
        )));
    };

    let mut update = kyc_document::ActiveModel {
        av_status: Set(status),
        av_scanned_at: Set(Some(Utc::now().into())),
        av_message: Set(message),
        ..Default::default()
    };
    if let Some(path) = path {
        update.path = Set(path);
    }

    let result = KycDocument::update_many()
        .set(update)
        .filter(kyc_document::Column::Id.eq(document_id))
        .filter(kyc_document::Column::AvStatus.eq(AvStatus::Pending))
        .exec(db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(result.rows_affected > 0)
}
