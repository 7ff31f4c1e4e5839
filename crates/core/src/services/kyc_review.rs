//! Admin review of KYC submissions.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use kyc_common::{AppError, AppResult, KycConfig, StorageManager};
use kyc_db::{
    entities::{
        KycDocument, KycSubmission, User, kyc_document,
        kyc_submission::{self, SubmissionEvent, SubmissionStatus},
        user::{self, KycStatus},
    },
    repositories::{KycDocumentRepository, KycSubmissionRepository, UserRepository},
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;

use super::kyc_view::{SubmissionView, SubmissionViewLoader};
use super::quarantine::QuarantineManager;

/// Verification state of one user, as shown to that user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycStatusView {
    pub kyc_status: KycStatus,
    pub kyc_verified_at: Option<DateTime<FixedOffset>>,
    pub latest_submission: Option<SubmissionView>,
}

/// KYC review service.
#[derive(Clone)]
pub struct KycReviewService {
    db: Arc<DatabaseConnection>,
    submission_repo: KycSubmissionRepository,
    document_repo: KycDocumentRepository,
    user_repo: UserRepository,
    views: SubmissionViewLoader,
    storage: Arc<StorageManager>,
    retention_days: i64,
}

impl KycReviewService {
    /// Create a new review service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: Arc<StorageManager>,
        config: &KycConfig,
    ) -> Self {
        let document_repo = KycDocumentRepository::new(db.clone());
        let user_repo = UserRepository::new(db.clone());

        Self {
            submission_repo: KycSubmissionRepository::new(db.clone()),
            views: SubmissionViewLoader::new(
                document_repo.clone(),
                user_repo.clone(),
                QuarantineManager::new(&config.quarantine_prefix),
            ),
            document_repo,
            user_repo,
            db,
            storage,
            retention_days: config.retention_days,
        }
    }

    /// List submissions, newest first.
    pub async fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<SubmissionView>> {
        let submissions = self.submission_repo.list(status, limit, offset).await?;
        self.views.load_many(submissions).await
    }

    /// Get one submission.
    pub async fn get_submission(&self, id: &str) -> AppResult<SubmissionView> {
        let submission = self.submission_repo.get_by_id(id).await?;
        self.views.load(submission).await
    }

    /// Verification state of `user_id` with their latest submission.
    pub async fn status_for_user(&self, user_id: &str) -> AppResult<KycStatusView> {
        let user = self.user_repo.get_by_id(user_id).await?;
        let latest_submission = match self.submission_repo.find_latest_for_user(user_id).await? {
            Some(submission) => Some(self.views.load(submission).await?),
            None => None,
        };

        Ok(KycStatusView {
            kyc_status: user.kyc_status,
            kyc_verified_at: user.kyc_verified_at,
            latest_submission,
        })
    }

    /// Approve a pending submission; the owner becomes verified.
    pub async fn approve(
        &self,
        id: &str,
        reviewer_id: &str,
        note: Option<&str>,
    ) -> AppResult<SubmissionView> {
        self.decide(id, reviewer_id, note, SubmissionEvent::Approve)
            .await
    }

    /// Reject a pending submission.
    pub async fn reject(
        &self,
        id: &str,
        reviewer_id: &str,
        note: Option<&str>,
    ) -> AppResult<SubmissionView> {
        self.decide(id, reviewer_id, note, SubmissionEvent::Reject)
            .await
    }

    async fn decide(
        &self,
        id: &str,
        reviewer_id: &str,
        note: Option<&str>,
        event: SubmissionEvent,
    ) -> AppResult<SubmissionView> {
        let submission = self.submission_repo.get_by_id(id).await?;
        let Some(status) = submission.status.apply(event) else {
            return Err(not_pending(&submission));
        };

        let now = Utc::now();
        let purge_after = now + Duration::days(self.retention_days);
        let (kyc_status, kyc_verified_at) = match status {
            SubmissionStatus::Approved => (KycStatus::Approved, Some(now.into())),
            _ => (KycStatus::Rejected, None),
        };

        let txn = self.begin().await?;

        // The pending guard lives in the UPDATE so only one reviewer wins.
        let updated = KycSubmission::update_many()
            .set(kyc_submission::ActiveModel {
                status: Set(status),
                reviewed_at: Set(Some(now.into())),
                reviewer_id: Set(Some(reviewer_id.to_string())),
                reviewer_note: Set(note.map(String::from)),
                purge_after: Set(Some(purge_after.into())),
                ..Default::default()
            })
            .filter(kyc_submission::Column::Id.eq(id))
            .filter(kyc_submission::Column::Status.eq(SubmissionStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::Conflict(format!(
                "KYC submission {id} was already reviewed"
            )));
        }

        set_user_status(&txn, &submission.user_id, kyc_status, kyc_verified_at, now).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            target: "kyc::audit",
            submission_id = %id,
            user_id = %submission.user_id,
            reviewer_id = %reviewer_id,
            status = status.as_str(),
            "KYC submission reviewed"
        );

        self.get_submission(id).await
    }

    /// Delete every document of a submission and mark it `withdrawn`.
    ///
    /// Accepted from any status. Files are deleted first; if any deletion
    /// fails no row is touched. Redacting an already withdrawn submission
    /// without documents changes nothing.
    pub async fn redact(
        &self,
        id: &str,
        reviewer_id: &str,
        note: Option<&str>,
    ) -> AppResult<SubmissionView> {
        let submission = self.submission_repo.get_by_id(id).await?;
        let documents = self.document_repo.find_by_submission(id).await?;

        if submission.status == SubmissionStatus::Withdrawn && documents.is_empty() {
            return self.views.load(submission).await;
        }

        let mut failed = 0usize;
        for document in &documents {
            if let Err(e) = self.delete_file(document).await {
                failed += 1;
                tracing::error!(
                    target: "kyc::audit",
                    submission_id = %id,
                    document_id = %document.id,
                    path = %document.path,
                    error = %e,
                    "Failed to delete document file during redaction"
                );
            }
        }
        if failed > 0 {
            return Err(AppError::Storage(format!(
                "failed to delete {failed} of {} document files of submission {id}",
                documents.len()
            )));
        }

        let status = submission
            .status
            .apply(SubmissionEvent::Redact)
            .ok_or_else(|| not_pending(&submission))?;
        let now = Utc::now();

        let txn = self.begin().await?;

        KycDocument::delete_many()
            .filter(kyc_document::Column::SubmissionId.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        KycSubmission::update_many()
            .set(kyc_submission::ActiveModel {
                status: Set(status),
                reviewed_at: Set(Some(now.into())),
                reviewer_id: Set(Some(reviewer_id.to_string())),
                reviewer_note: Set(note.map(String::from)),
                ..Default::default()
            })
            .filter(kyc_submission::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        set_user_status(&txn, &submission.user_id, KycStatus::Unverified, None, now).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(
            target: "kyc::audit",
            submission_id = %id,
            user_id = %submission.user_id,
            reviewer_id = %reviewer_id,
            previous_status = submission.status.as_str(),
            deleted_files = documents.len(),
            "KYC submission redacted"
        );

        self.get_submission(id).await
    }

    async fn delete_file(&self, document: &kyc_document::Model) -> AppResult<()> {
        self.storage.disk(&document.disk)?.delete(&document.path).await
    }

    async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

fn not_pending(submission: &kyc_submission::Model) -> AppError {
    AppError::Conflict(format!(
        "KYC submission {} is {}, not pending",
        submission.id,
        submission.status.as_str()
    ))
}

async fn set_user_status(
    txn: &DatabaseTransaction,
    user_id: &str,
    kyc_status: KycStatus,
    kyc_verified_at: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    User::update_many()
        .set(user::ActiveModel {
            kyc_status: Set(kyc_status),
            kyc_verified_at: Set(kyc_verified_at),
            updated_at: Set(Some(now.into())),
            ..Default::default()
        })
        .filter(user::Column::Id.eq(user_id))
        .exec(txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    Ok(())
}
