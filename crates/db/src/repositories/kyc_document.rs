//! KYC document repository.

use std::sync::Arc;

use crate::entities::{
    KycDocument,
    kyc_document::{self, AvStatus},
};
use chrono::{DateTime, Utc};
use kyc_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};

/// KYC document repository for database operations.
#[derive(Clone)]
pub struct KycDocumentRepository {
    db: Arc<DatabaseConnection>,
}

impl KycDocumentRepository {
    /// Create a new document repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a document by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<kyc_document::Model>> {
        KycDocument::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Documents of one submission, in upload order.
    pub async fn find_by_submission(
        &self,
        submission_id: &str,
    ) -> AppResult<Vec<kyc_document::Model>> {
        KycDocument::find()
            .filter(kyc_document::Column::SubmissionId.eq(submission_id))
            .order_by_asc(kyc_document::Column::CreatedAt)
            .order_by_asc(kyc_document::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Documents of several submissions in one query.
    pub async fn find_by_submissions(
        &self,
        submission_ids: &[String],
    ) -> AppResult<Vec<kyc_document::Model>> {
        if submission_ids.is_empty() {
            return Ok(vec![]);
        }

        KycDocument::find()
            .filter(kyc_document::Column::SubmissionId.is_in(submission_ids.to_vec()))
            .order_by_asc(kyc_document::Column::SubmissionId)
            .order_by_asc(kyc_document::Column::CreatedAt)
            .order_by_asc(kyc_document::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Documents still waiting for a verdict that were uploaded before
    /// `older_than`, oldest first.
    pub async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<kyc_document::Model>> {
        KycDocument::find()
            .filter(kyc_document::Column::AvStatus.eq(AvStatus::Pending))
            .filter(kyc_document::Column::CreatedAt.lt(older_than))
            .order_by_asc(kyc_document::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
