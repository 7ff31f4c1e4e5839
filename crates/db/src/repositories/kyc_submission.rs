//! KYC submission repository.

use std::sync::Arc;

use crate::entities::{
    KycDocument, KycSubmission, kyc_document,
    kyc_submission::{self, SubmissionStatus},
};
use chrono::{DateTime, Utc};
use kyc_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    sea_query::Query,
};

/// KYC submission repository for database operations.
#[derive(Clone)]
pub struct KycSubmissionRepository {
    db: Arc<DatabaseConnection>,
}

impl KycSubmissionRepository {
    /// Create a new submission repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a submission by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<kyc_submission::Model>> {
        KycSubmission::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a submission by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<kyc_submission::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("KYC submission {id}")))
    }

    /// Find the user's submission that is still awaiting review.
    pub async fn find_pending_for_user(
        &self,
        user_id: &str,
    ) -> AppResult<Option<kyc_submission::Model>> {
        KycSubmission::find()
            .filter(kyc_submission::Column::UserId.eq(user_id))
            .filter(kyc_submission::Column::Status.eq(SubmissionStatus::Pending))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the user's most recent submission.
    pub async fn find_latest_for_user(
        &self,
        user_id: &str,
    ) -> AppResult<Option<kyc_submission::Model>> {
        KycSubmission::find()
            .filter(kyc_submission::Column::UserId.eq(user_id))
            .order_by_desc(kyc_submission::Column::SubmittedAt)
            .order_by_desc(kyc_submission::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List submissions, newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<SubmissionStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<kyc_submission::Model>> {
        let mut query = KycSubmission::find()
            .order_by_desc(kyc_submission::Column::SubmittedAt)
            .order_by_desc(kyc_submission::Column::Id);

        if let Some(status) = status {
            query = query.filter(kyc_submission::Column::Status.eq(status));
        }

        query
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Submissions whose retention has expired and that still own documents.
    ///
    /// Keyset-paginated by id: pass the last id of the previous batch as
    /// `after_id`.
    pub async fn find_purgeable(
        &self,
        now: DateTime<Utc>,
        after_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<kyc_submission::Model>> {
        purgeable_query(now, after_id, limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

fn purgeable_query(
    now: DateTime<Utc>,
    after_id: Option<&str>,
    limit: u64,
) -> Select<KycSubmission> {
    let with_documents = Query::select()
        .column(kyc_document::Column::SubmissionId)
        .from(KycDocument)
        .to_owned();

    let mut query = KycSubmission::find()
        .filter(kyc_submission::Column::PurgeAfter.is_not_null())
        .filter(kyc_submission::Column::PurgeAfter.lte(now))
        .filter(kyc_submission::Column::Id.in_subquery(with_documents));

    if let Some(after_id) = after_id {
        query = query.filter(kyc_submission::Column::Id.gt(after_id));
    }

    query.order_by_asc(kyc_submission::Column::Id).limit(limit)
}
