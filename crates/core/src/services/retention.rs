//! Retention purge of reviewed KYC documents.
//!
//! Submissions whose `purge_after` has passed lose their files and document
//! rows; the submission row stays as the audit record. A submission's rows
//! are only deleted when every one of its files was deleted.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use kyc_common::{AppResult, KycConfig, StorageManager};
use kyc_db::{
    entities::{
        KycDocument, kyc_document,
        kyc_submission::{self, SubmissionStatus},
    },
    repositories::{KycDocumentRepository, KycSubmissionRepository},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;

/// A submission eligible for purging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeCandidate {
    pub submission_id: String,
    pub status: SubmissionStatus,
    pub purge_after: Option<DateTime<FixedOffset>>,
    pub document_count: usize,
}

/// A file that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    pub submission_id: String,
    pub document_id: String,
    pub path: String,
    pub error: String,
}

/// A submission whose files were deleted but whose document rows were not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeRowFailure {
    pub submission_id: String,
    pub error: String,
}

/// Outcome of one purge run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub dry_run: bool,
    /// Eligible submissions (filled on dry runs only).
    pub candidates: Vec<PurgeCandidate>,
    pub purged_submissions: u64,
    pub deleted_files: u64,
    pub failures: Vec<PurgeFailure>,
    pub row_failures: Vec<PurgeRowFailure>,
}

impl PurgeReport {
    /// Whether any file or row deletion failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Number of failed file and row deletions.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.failures.len() + self.row_failures.len()
    }
}

impl fmt::Display for PurgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            let files: usize = self.candidates.iter().map(|c| c.document_count).sum();
            write!(
                f,
                "dry run: {} submissions eligible, {files} files would be deleted",
                self.candidates.len()
            )
        } else {
            write!(
                f,
                "purged {} submissions, deleted {} files, {} errors",
                self.purged_submissions,
                self.deleted_files,
                self.error_count()
            )
        }
    }
}

/// Retention purge service.
#[derive(Clone)]
pub struct RetentionService {
    db: Arc<DatabaseConnection>,
    submission_repo: KycSubmissionRepository,
    document_repo: KycDocumentRepository,
    storage: Arc<StorageManager>,
    batch_size: u64,
}

impl RetentionService {
    /// Create a new retention service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: Arc<StorageManager>,
        config: &KycConfig,
    ) -> Self {
        Self {
            submission_repo: KycSubmissionRepository::new(db.clone()),
            document_repo: KycDocumentRepository::new(db.clone()),
            db,
            storage,
            batch_size: config.purge_batch_size.max(1),
        }
    }

    /// Purge every expired submission. A dry run only reports candidates.
    pub async fn purge(&self, dry_run: bool) -> AppResult<PurgeReport> {
        let now = Utc::now();
        let mut report = PurgeReport {
            dry_run,
            ..PurgeReport::default()
        };
        let mut cursor: Option<String> = None;

        loop {
            let batch = self
                .submission_repo
                .find_purgeable(now, cursor.as_deref(), self.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            let full_batch = batch.len() as u64 == self.batch_size;

            let ids: Vec<String> = batch.iter().map(|s| s.id.clone()).collect();
            let mut documents: HashMap<String, Vec<kyc_document::Model>> = HashMap::new();
            for document in self.document_repo.find_by_submissions(&ids).await? {
                documents
                    .entry(document.submission_id.clone())
                    .or_default()
                    .push(document);
            }

            for submission in batch {
                let docs = documents.remove(&submission.id).unwrap_or_default();
                if dry_run {
                    report.candidates.push(PurgeCandidate {
                        submission_id: submission.id,
                        status: submission.status,
                        purge_after: submission.purge_after,
                        document_count: docs.len(),
                    });
                } else {
                    self.purge_submission(&submission, &docs, &mut report).await;
                }
            }

            if !full_batch {
                break;
            }
        }

        tracing::info!(
            target: "kyc::audit",
            dry_run,
            candidates = report.candidates.len(),
            purged_submissions = report.purged_submissions,
            deleted_files = report.deleted_files,
            failures = report.error_count(),
            "Retention purge finished"
        );

        Ok(report)
    }

    async fn purge_submission(
        &self,
        submission: &kyc_submission::Model,
        documents: &[kyc_document::Model],
        report: &mut PurgeReport,
    ) {
        let mut clean = true;

        for document in documents {
            let deleted = match self.storage.disk(&document.disk) {
                Ok(disk) => disk.delete(&document.path).await,
                Err(e) => Err(e),
            };

            match deleted {
                Ok(()) => report.deleted_files += 1,
                Err(e) => {
                    clean = false;
                    tracing::error!(
                        target: "kyc::audit",
                        submission_id = %submission.id,
                        document_id = %document.id,
                        path = %document.path,
                        error = %e,
                        "Failed to delete expired document file"
                    );
                    report.failures.push(PurgeFailure {
                        submission_id: submission.id.clone(),
                        document_id: document.id.clone(),
                        path: document.path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !clean {
            return;
        }

        if let Err(e) = KycDocument::delete_many()
            .filter(kyc_document::Column::SubmissionId.eq(submission.id.as_str()))
            .exec(self.db.as_ref())
            .await
        {
            tracing::error!(
                target: "kyc::audit",
                submission_id = %submission.id,
                error = %e,
                "Failed to delete document rows of purged submission"
            );
            report.row_failures.push(PurgeRowFailure {
                submission_id: submission.id.clone(),
                error: e.to_string(),
            });
            return;
        }

        report.purged_submissions += 1;
        tracing::info!(
            target: "kyc::audit",
            submission_id = %submission.id,
            status = submission.status.as_str(),
            deleted_files = documents.len(),
            "Purged expired KYC documents"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use kyc_common::{AppError, LocalStorage, StorageBackend};
    use kyc_db::entities::kyc_document::{AvStatus, DocType};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};
    use std::path::PathBuf;

    /// Disk whose deletes fail for paths containing `fail`.
    struct FlakyDisk {
        inner: LocalStorage,
    }

    #[async_trait]
    impl StorageBackend for FlakyDisk {
        async fn put(&self, path: &str, data: &[u8]) -> AppResult<()> {
            self.inner.put(path, data).await
        }
        async fn delete(&self, path: &str) -> AppResult<()> {
            if path.contains("fail") {
                return Err(AppError::Storage(format!("permission denied: {path}")));
            }
            self.inner.delete(path).await
        }
        async fn exists(&self, path: &str) -> AppResult<bool> {
            self.inner.exists(path).await
        }
        async fn move_to(&self, from: &str, to: &str) -> AppResult<()> {
            self.inner.move_to(from, to).await
        }
        fn local_path(&self, path: &str) -> Option<PathBuf> {
            self.inner.local_path(path)
        }
    }

    fn expired(id: &str) -> kyc_submission::Model {
        kyc_submission::Model {
            id: id.to_string(),
            user_id: "user1".to_string(),
            status: SubmissionStatus::Approved,
            submitted_at: (Utc::now() - Duration::days(120)).into(),
            reviewed_at: Some((Utc::now() - Duration::days(100)).into()),
            reviewer_id: Some("admin1".to_string()),
            reviewer_note: None,
            purge_after: Some((Utc::now() - Duration::days(10)).into()),
        }
    }

    fn document(id: &str, submission_id: &str, path: &str) -> kyc_document::Model {
        kyc_document::Model {
            id: id.to_string(),
            submission_id: submission_id.to_string(),
            user_id: "user1".to_string(),
            doc_type: DocType::Selfie,
            original_name: "me.jpg".to_string(),
            declared_mime: "image/jpeg".to_string(),
            detected_mime: "image/jpeg".to_string(),
            size: 3,
            disk: "local".to_string(),
            path: path.to_string(),
            av_status: AvStatus::Clean,
            av_scanned_at: None,
            av_message: None,
            created_at: Utc::now().into(),
        }
    }

    async fn disk() -> (PathBuf, Arc<FlakyDisk>) {
        let root = std::env::temp_dir().join(format!("kyc-retention-{}", ulid::Ulid::new()));
        let disk = Arc::new(FlakyDisk {
            inner: LocalStorage::new(root.clone()),
        });
        for path in ["kyc/sub1/a.jpg", "kyc/sub1/b.jpg", "kyc/sub2/fail.jpg"] {
            disk.put(path, b"\xFF\xD8\xFF").await.unwrap();
        }
        (root, disk)
    }

    fn service(db: MockDatabase, disk: Arc<FlakyDisk>) -> RetentionService {
        RetentionService::new(
            Arc::new(db.into_connection()),
            Arc::new(StorageManager::new().with_disk("local", disk)),
            &KycConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_deleting() {
        let (root, disk) = disk().await;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[expired("sub1")]])
            .append_query_results([[
                document("doc1", "sub1", "kyc/sub1/a.jpg"),
                document("doc2", "sub1", "kyc/sub1/b.jpg"),
            ]]);

        let report = service(db, disk.clone()).purge(true).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].document_count, 2);
        assert_eq!(report.purged_submissions, 0);
        assert!(!report.has_errors());
        assert!(disk.exists("kyc/sub1/a.jpg").await.unwrap());
        assert_eq!(
            report.to_string(),
            "dry run: 1 submissions eligible, 2 files would be deleted"
        );

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_rows_of_that_submission() {
        let (root, disk) = disk().await;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[expired("sub1"), expired("sub2")]])
            .append_query_results([[
                document("doc1", "sub1", "kyc/sub1/a.jpg"),
                document("doc2", "sub1", "kyc/sub1/b.jpg"),
                document("doc3", "sub2", "kyc/sub2/fail.jpg"),
            ]])
            // Only sub1's rows are deleted.
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }]);

        let report = service(db, disk.clone()).purge(false).await.unwrap();

        assert_eq!(report.purged_submissions, 1);
        assert_eq!(report.deleted_files, 2);
        assert!(report.has_errors());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].document_id, "doc3");
        assert_eq!(report.failures[0].submission_id, "sub2");
        assert!(!disk.exists("kyc/sub1/a.jpg").await.unwrap());
        assert!(disk.exists("kyc/sub2/fail.jpg").await.unwrap());
        assert_eq!(report.to_string(), "purged 1 submissions, deleted 2 files, 1 errors");

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_row_delete_error_does_not_stop_the_batch() {
        let (root, disk) = disk().await;
        disk.put("kyc/sub3/c.jpg", b"\xFF\xD8\xFF").await.unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[expired("sub1"), expired("sub3")]])
            .append_query_results([[
                document("doc1", "sub1", "kyc/sub1/a.jpg"),
                document("doc3", "sub3", "kyc/sub3/c.jpg"),
            ]])
            .append_exec_errors([DbErr::Custom("connection reset".to_string())])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);

        let report = service(db, disk.clone()).purge(false).await.unwrap();

        assert_eq!(report.purged_submissions, 1);
        assert_eq!(report.deleted_files, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.row_failures.len(), 1);
        assert_eq!(report.row_failures[0].submission_id, "sub1");
        assert!(report.has_errors());
        assert!(!disk.exists("kyc/sub3/c.jpg").await.unwrap());
        assert_eq!(report.to_string(), "purged 1 submissions, deleted 2 files, 1 errors");

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_nothing_to_purge() {
        let (root, disk) = disk().await;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<kyc_submission::Model>::new()]);

        let report = service(db, disk).purge(false).await.unwrap();

        assert_eq!(report.purged_submissions, 0);
        assert!(!report.has_errors());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_full_batch_fetches_next_page() {
        let (root, disk) = disk().await;
        let config = KycConfig {
            purge_batch_size: 1,
            ..KycConfig::default()
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[expired("sub1")]])
            .append_query_results([[document("doc1", "sub1", "kyc/sub1/a.jpg")]])
            .append_query_results([Vec::<kyc_submission::Model>::new()]);

        let service = RetentionService::new(
            Arc::new(db.into_connection()),
            Arc::new(StorageManager::new().with_disk("local", disk)),
            &config,
        );
        let report = service.purge(true).await.unwrap();

        assert_eq!(report.candidates.len(), 1);

        let _ = std::fs::remove_dir_all(root);
    }
}
