//! KYC intake: validates uploaded identity documents and opens a submission.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use kyc_common::{
    AppError, AppResult, IdGenerator, KycConfig, StorageBackend, StorageManager,
    generate_storage_key,
};
use kyc_db::{
    entities::{
        KycDocument, KycSubmission, User,
        kyc_document::{self, AvStatus, DocType},
        kyc_submission::{self, SubmissionStatus},
        user::{self, KycStatus},
    },
    repositories::KycSubmissionRepository,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};

use super::kyc_view::{SubmissionView, UserVerification};
use super::magic::MagicByteValidator;
use super::quarantine::QuarantineManager;
use super::scan_queue::ScanQueueService;

/// Longest original file name kept on the document row.
const MAX_ORIGINAL_NAME_LEN: usize = 255;

/// One uploaded file of a submission.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub doc_type: DocType,
    pub original_name: String,
    pub declared_mime: String,
    pub data: Vec<u8>,
}

/// A document that passed validation.
struct ValidatedDocument {
    upload: UploadedDocument,
    detected_mime: &'static str,
}

/// KYC intake service.
#[derive(Clone)]
pub struct KycIntakeService {
    db: Arc<DatabaseConnection>,
    submission_repo: KycSubmissionRepository,
    storage: Arc<StorageManager>,
    scan_queue: ScanQueueService,
    validator: MagicByteValidator,
    quarantine: QuarantineManager,
    id_gen: IdGenerator,
    config: KycConfig,
}

impl KycIntakeService {
    /// Create a new intake service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        storage: Arc<StorageManager>,
        scan_queue: ScanQueueService,
        config: &KycConfig,
    ) -> Self {
        Self {
            submission_repo: KycSubmissionRepository::new(db.clone()),
            db,
            storage,
            scan_queue,
            validator: MagicByteValidator::new(&config.allowed_magic_mimes),
            quarantine: QuarantineManager::new(&config.quarantine_prefix),
            id_gen: IdGenerator::new(),
            config: config.clone(),
        }
    }

    /// Validate and store a new submission for `user_id`.
    ///
    /// Every check runs before anything is written. Files are stored first,
    /// then the submission, its documents and the user's `pending` status
    /// are written in one transaction; stored files are removed again when
    /// that transaction fails. One scan job is queued per document.
    pub async fn submit(
        &self,
        user_id: &str,
        documents: Vec<UploadedDocument>,
    ) -> AppResult<SubmissionView> {
        let documents = self.validate(documents)?;

        if self.submission_repo.find_pending_for_user(user_id).await?.is_some() {
            return Err(AppError::Conflict(
                "A KYC submission is already awaiting review".to_string(),
            ));
        }

        let disk = self.storage.disk(&self.config.disk)?;
        let now = Utc::now();
        let submission_id = self.id_gen.generate();

        let mut stored: Vec<kyc_document::Model> = Vec::with_capacity(documents.len());
        for document in documents {
            let path = generate_storage_key(
                user_id,
                &submission_id,
                document.upload.doc_type.as_str(),
                extension_for(document.detected_mime),
            );

            if let Err(e) = disk.put(&path, &document.upload.data).await {
                remove_stored(disk.as_ref(), &stored).await;
                return Err(e);
            }

            stored.push(kyc_document::Model {
                id: self.id_gen.generate(),
                submission_id: submission_id.clone(),
                user_id: user_id.to_string(),
                doc_type: document.upload.doc_type,
                original_name: document.upload.original_name,
                declared_mime: document.upload.declared_mime,
                detected_mime: document.detected_mime.to_string(),
                size: document.upload.data.len() as i64,
                disk: self.config.disk.clone(),
                path,
                av_status: AvStatus::Pending,
                av_scanned_at: None,
                av_message: None,
                created_at: now.into(),
            });
        }

        let submission = kyc_submission::Model {
            id: submission_id,
            user_id: user_id.to_string(),
            status: SubmissionStatus::Pending,
            submitted_at: now.into(),
            reviewed_at: None,
            reviewer_id: None,
            reviewer_note: None,
            purge_after: None,
        };

        if let Err(e) = self.persist(&submission, &stored).await {
            remove_stored(disk.as_ref(), &stored).await;
            return Err(e);
        }

        tracing::info!(
            target: "kyc::audit",
            submission_id = %submission.id,
            user_id = %user_id,
            documents = stored.len(),
            "KYC submission received"
        );

        for document in &stored {
            if let Err(e) = self.scan_queue.enqueue(&document.id).await {
                // The stale scan report picks these up for requeueing.
                tracing::error!(
                    document_id = %document.id,
                    submission_id = %submission.id,
                    error = %e,
                    "Failed to enqueue antivirus scan"
                );
            }
        }

        let owner = UserVerification {
            id: user_id.to_string(),
            kyc_status: KycStatus::Pending,
            kyc_verified_at: None,
        };

        Ok(SubmissionView::new(
            submission,
            stored,
            Some(owner),
            &self.quarantine,
        ))
    }

    fn validate(&self, documents: Vec<UploadedDocument>) -> AppResult<Vec<ValidatedDocument>> {
        let mut seen = HashSet::new();
        for document in &documents {
            if !seen.insert(document.doc_type) {
                return Err(AppError::invalid_field(
                    field_name(document.doc_type),
                    "only one document of each type is accepted",
                ));
            }
        }

        if let Some(missing) = DocType::REQUIRED.into_iter().find(|t| !seen.contains(t)) {
            return Err(AppError::invalid_field(field_name(missing), "document is required"));
        }

        let max_size = self.config.max_file_size_bytes();
        let mut validated = Vec::with_capacity(documents.len());
        for mut upload in documents {
            let field = field_name(upload.doc_type);

            if upload.data.is_empty() {
                return Err(AppError::invalid_field(field, "file is empty"));
            }
            if upload.data.len() as u64 > max_size {
                return Err(AppError::invalid_field(
                    field,
                    format!("file exceeds {} KiB", self.config.max_file_size_kb),
                ));
            }

            upload.original_name = sanitize_name(&upload.original_name);
            let detected_mime = self.validator.validate(
                &field,
                &upload.data,
                &upload.original_name,
                &upload.declared_mime,
            )?;

            validated.push(ValidatedDocument {
                upload,
                detected_mime,
            });
        }

        Ok(validated)
    }

    async fn persist(
        &self,
        submission: &kyc_submission::Model,
        documents: &[kyc_document::Model],
    ) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Guards against a concurrent intake for the same user.
        let updated = User::update_many()
            .set(user::ActiveModel {
                kyc_status: Set(KycStatus::Pending),
                kyc_verified_at: Set(None),
                updated_at: Set(Some(submission.submitted_at)),
                ..Default::default()
            })
            .filter(user::Column::Id.eq(submission.user_id.as_str()))
            .filter(user::Column::KycStatus.ne(KycStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected == 0 {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::Conflict(
                "Identity verification is already pending for this user".to_string(),
            ));
        }

        KycSubmission::insert(kyc_submission::ActiveModel::from(submission.clone()))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        KycDocument::insert_many(
            documents
                .iter()
                .cloned()
                .map(kyc_document::ActiveModel::from),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Request field a document type is reported under.
fn field_name(doc_type: DocType) -> String {
    format!("documents.{}", doc_type.as_str())
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// Last path component of a client file name, without control characters.
fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_ORIGINAL_NAME_LEN)
        .collect();

    if cleaned.trim().is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

async fn remove_stored(disk: &dyn StorageBackend, documents: &[kyc_document::Model]) {
    for document in documents {
        if let Err(e) = disk.delete(&document.path).await {
            tracing::warn!(
                path = %document.path,
                error = %e,
                "Failed to remove stored upload after aborted intake"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::scan_queue::ScanQueue;
    use async_trait::async_trait;
    use kyc_common::LocalStorage;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PDF: &[u8] = b"%PDF-1.7\n1 0 obj";

    #[derive(Default)]
    struct RecordingQueue {
        enqueued: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ScanQueue for RecordingQueue {
        async fn enqueue(&self, document_id: &str) -> AppResult<()> {
            self.enqueued.lock().unwrap().push(document_id.to_string());
            Ok(())
        }

        async fn schedule_retry(&self, _: &str, _: u32, _: Duration) -> AppResult<()> {
            Ok(())
        }
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("kyc-intake-{}", ulid::Ulid::new()))
    }

    fn service(db: MockDatabase, root: PathBuf, queue: Arc<RecordingQueue>) -> KycIntakeService {
        let storage = StorageManager::new().with_disk("local", Arc::new(LocalStorage::new(root)));
        KycIntakeService::new(
            Arc::new(db.into_connection()),
            Arc::new(storage),
            queue,
            &KycConfig::default(),
        )
    }

    fn upload(doc_type: DocType, name: &str, mime: &str, data: &[u8]) -> UploadedDocument {
        UploadedDocument {
            doc_type,
            original_name: name.to_string(),
            declared_mime: mime.to_string(),
            data: data.to_vec(),
        }
    }

    fn complete_set() -> Vec<UploadedDocument> {
        vec![
            upload(DocType::IdFront, "front.jpg", "image/jpeg", JPEG),
            upload(DocType::Selfie, "me.jpg", "image/jpeg", JPEG),
            upload(DocType::ProofOfAddress, "bill.pdf", "application/pdf", PDF),
        ]
    }

    fn count_files(root: &std::path::Path) -> usize {
        fn walk(dir: &std::path::Path, count: &mut usize) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, count);
                } else {
                    *count += 1;
                }
            }
        }
        let mut count = 0;
        walk(root, &mut count);
        count
    }

    #[tokio::test]
    async fn test_submit_stores_files_and_enqueues_scans() {
        let root = temp_root();
        let queue = Arc::new(RecordingQueue::default());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<kyc_submission::Model>::new()])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                },
            ]);

        let view = service(db, root.clone(), queue.clone())
            .submit("user1", complete_set())
            .await
            .unwrap();

        assert_eq!(view.status, SubmissionStatus::Pending);
        assert_eq!(view.documents.len(), 3);
        assert!(view.documents.iter().all(|d| d.av_status == AvStatus::Pending));
        assert_eq!(view.documents[2].detected_mime, "application/pdf");
        assert_eq!(view.user.unwrap().kyc_status, KycStatus::Pending);
        assert_eq!(queue.enqueued.lock().unwrap().len(), 3);
        assert_eq!(count_files(&root), 3);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_pdf_bytes_named_jpg_rejected_without_writes() {
        let root = temp_root();
        let queue = Arc::new(RecordingQueue::default());
        let mut documents = complete_set();
        documents[0] = upload(DocType::IdFront, "front.jpg", "image/jpeg", PDF);

        let err = service(MockDatabase::new(DatabaseBackend::Postgres), root.clone(), queue.clone())
            .submit("user1", documents)
            .await
            .unwrap_err();

        assert_eq!(err.field(), Some("documents.id_front"));
        assert!(err.to_string().contains("type mismatch"));
        assert!(queue.enqueued.lock().unwrap().is_empty());
        assert_eq!(count_files(&root), 0);
    }

    #[tokio::test]
    async fn test_pdf_bytes_named_jpg_with_generic_type_rejected() {
        let root = temp_root();
        let queue = Arc::new(RecordingQueue::default());
        let mut documents = complete_set();
        documents[0] = upload(DocType::IdFront, "front.jpg", "application/octet-stream", PDF);

        let err = service(MockDatabase::new(DatabaseBackend::Postgres), root.clone(), queue.clone())
            .submit("user1", documents)
            .await
            .unwrap_err();

        assert_eq!(err.field(), Some("documents.id_front"));
        assert!(err.to_string().contains("type mismatch"));
        assert!(queue.enqueued.lock().unwrap().is_empty());
        assert_eq!(count_files(&root), 0);
    }

    #[tokio::test]
    async fn test_missing_required_document() {
        let mut documents = complete_set();
        documents.remove(1);

        let err = service(
            MockDatabase::new(DatabaseBackend::Postgres),
            temp_root(),
            Arc::new(RecordingQueue::default()),
        )
        .submit("user1", documents)
        .await
        .unwrap_err();

        assert_eq!(err.field(), Some("documents.selfie"));
    }

    #[tokio::test]
    async fn test_duplicate_document_type() {
        let mut documents = complete_set();
        documents.push(upload(DocType::Selfie, "me2.jpg", "image/jpeg", JPEG));

        let err = service(
            MockDatabase::new(DatabaseBackend::Postgres),
            temp_root(),
            Arc::new(RecordingQueue::default()),
        )
        .submit("user1", documents)
        .await
        .unwrap_err();

        assert_eq!(err.field(), Some("documents.selfie"));
        assert!(err.to_string().contains("only one document"));
    }

    #[tokio::test]
    async fn test_empty_and_oversized_files() {
        let mut documents = complete_set();
        documents[1].data.clear();

        let err = service(
            MockDatabase::new(DatabaseBackend::Postgres),
            temp_root(),
            Arc::new(RecordingQueue::default()),
        )
        .submit("user1", documents)
        .await
        .unwrap_err();
        assert!(err.to_string().contains("file is empty"));

        let mut documents = complete_set();
        let mut big = JPEG.to_vec();
        big.resize(10 * 1024 * 1024 + 1, 0);
        documents[0].data = big;

        let err = service(
            MockDatabase::new(DatabaseBackend::Postgres),
            temp_root(),
            Arc::new(RecordingQueue::default()),
        )
        .submit("user1", documents)
        .await
        .unwrap_err();
        assert!(err.to_string().contains("exceeds 10240 KiB"));
    }

    #[tokio::test]
    async fn test_pending_submission_conflict() {
        let root = temp_root();
        let existing = kyc_submission::Model {
            id: "sub0".to_string(),
            user_id: "user1".to_string(),
            status: SubmissionStatus::Pending,
            submitted_at: Utc::now().into(),
            reviewed_at: None,
            reviewer_id: None,
            reviewer_note: None,
            purge_after: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[existing]]);

        let err = service(db, root.clone(), Arc::new(RecordingQueue::default()))
            .submit("user1", complete_set())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(count_files(&root), 0);
    }

    #[tokio::test]
    async fn test_user_guard_conflict_removes_stored_files() {
        let root = temp_root();
        let queue = Arc::new(RecordingQueue::default());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<kyc_submission::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }]);

        let err = service(db, root.clone(), queue.clone())
            .submit("user1", complete_set())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(count_files(&root), 0);
        assert!(queue.enqueued.lock().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("C:\\Users\\me\\passport.jpg"), "passport.jpg");
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("a\u{0}b.pdf"), "ab.pdf");
        assert_eq!(sanitize_name("  "), "upload");
        assert_eq!(sanitize_name(&"x".repeat(400)).len(), MAX_ORIGINAL_NAME_LEN);
    }
}
