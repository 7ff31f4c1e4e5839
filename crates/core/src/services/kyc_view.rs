//! Read model shared by intake, review and status endpoints.

use chrono::{DateTime, FixedOffset};
use kyc_common::AppResult;
use kyc_db::{
    entities::{kyc_document, kyc_submission, user},
    repositories::{KycDocumentRepository, UserRepository},
};
use serde::Serialize;
use std::collections::HashMap;

use super::quarantine::QuarantineManager;

/// Verification fields of the submission's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVerification {
    pub id: String,
    pub kyc_status: user::KycStatus,
    pub kyc_verified_at: Option<DateTime<FixedOffset>>,
}

impl From<&user::Model> for UserVerification {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            kyc_status: user.kyc_status,
            kyc_verified_at: user.kyc_verified_at,
        }
    }
}

/// A document as exposed over the API. Storage location is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    pub doc_type: kyc_document::DocType,
    pub original_name: String,
    pub declared_mime: String,
    pub detected_mime: String,
    pub size: i64,
    pub av_status: kyc_document::AvStatus,
    pub av_scanned_at: Option<DateTime<FixedOffset>>,
    pub av_message: Option<String>,
    pub quarantined: bool,
    pub created_at: DateTime<FixedOffset>,
}

impl DocumentView {
    #[must_use]
    pub fn new(document: kyc_document::Model, quarantine: &QuarantineManager) -> Self {
        let quarantined = quarantine.is_quarantined(&document.path);

        Self {
            id: document.id,
            doc_type: document.doc_type,
            original_name: document.original_name,
            declared_mime: document.declared_mime,
            detected_mime: document.detected_mime,
            size: document.size,
            av_status: document.av_status,
            av_scanned_at: document.av_scanned_at,
            av_message: document.av_message,
            quarantined,
            created_at: document.created_at,
        }
    }
}

/// A submission with its documents and the owner's cascaded fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: String,
    pub user_id: String,
    pub status: kyc_submission::SubmissionStatus,
    pub submitted_at: DateTime<FixedOffset>,
    pub reviewed_at: Option<DateTime<FixedOffset>>,
    pub reviewer_id: Option<String>,
    pub reviewer_note: Option<String>,
    pub purge_after: Option<DateTime<FixedOffset>>,
    pub documents: Vec<DocumentView>,
    pub user: Option<UserVerification>,
}

impl SubmissionView {
    #[must_use]
    pub fn new(
        submission: kyc_submission::Model,
        documents: Vec<kyc_document::Model>,
        user: Option<UserVerification>,
        quarantine: &QuarantineManager,
    ) -> Self {
        Self {
            id: submission.id,
            user_id: submission.user_id,
            status: submission.status,
            submitted_at: submission.submitted_at,
            reviewed_at: submission.reviewed_at,
            reviewer_id: submission.reviewer_id,
            reviewer_note: submission.reviewer_note,
            purge_after: submission.purge_after,
            documents: documents
                .into_iter()
                .map(|d| DocumentView::new(d, quarantine))
                .collect(),
            user,
        }
    }
}

/// Builds [`SubmissionView`]s with batched document and user lookups.
#[derive(Clone)]
pub struct SubmissionViewLoader {
    document_repo: KycDocumentRepository,
    user_repo: UserRepository,
    quarantine: QuarantineManager,
}

impl SubmissionViewLoader {
    #[must_use]
    pub fn new(
        document_repo: KycDocumentRepository,
        user_repo: UserRepository,
        quarantine: QuarantineManager,
    ) -> Self {
        Self {
            document_repo,
            user_repo,
            quarantine,
        }
    }

    /// View of one submission.
    pub async fn load(&self, submission: kyc_submission::Model) -> AppResult<SubmissionView> {
        let documents = self.document_repo.find_by_submission(&submission.id).await?;
        let user = self.user_repo.find_by_id(&submission.user_id).await?;

        Ok(SubmissionView::new(
            submission,
            documents,
            user.as_ref().map(UserVerification::from),
            &self.quarantine,
        ))
    }

    /// Views of several submissions, preserving their order.
    pub async fn load_many(
        &self,
        submissions: Vec<kyc_submission::Model>,
    ) -> AppResult<Vec<SubmissionView>> {
        let submission_ids: Vec<String> = submissions.iter().map(|s| s.id.clone()).collect();
        let mut user_ids: Vec<String> = submissions.iter().map(|s| s.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();

        let mut documents: HashMap<String, Vec<kyc_document::Model>> = HashMap::new();
        for document in self.document_repo.find_by_submissions(&submission_ids).await? {
            documents
                .entry(document.submission_id.clone())
                .or_default()
                .push(document);
        }

        let users: HashMap<String, UserVerification> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await?
            .iter()
            .map(|u| (u.id.clone(), UserVerification::from(u)))
            .collect();

        Ok(submissions
            .into_iter()
            .map(|submission| {
                let docs = documents.remove(&submission.id).unwrap_or_default();
                let user = users.get(&submission.user_id).cloned();
                SubmissionView::new(submission, docs, user, &self.quarantine)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kyc_db::entities::kyc_document::{AvStatus, DocType};

    fn document(path: &str) -> kyc_document::Model {
        kyc_document::Model {
            id: "doc1".to_string(),
            submission_id: "sub1".to_string(),
            user_id: "user1".to_string(),
            doc_type: DocType::Selfie,
            original_name: "me.jpg".to_string(),
            declared_mime: "image/jpeg".to_string(),
            detected_mime: "image/jpeg".to_string(),
            size: 3,
            disk: "local".to_string(),
            path: path.to_string(),
            av_status: AvStatus::Infected,
            av_scanned_at: None,
            av_message: Some("Eicar-Test-Signature".to_string()),
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_quarantined_flag_follows_prefix_rule() {
        let quarantine = QuarantineManager::new("/quarantine/");

        for path in ["quarantine/kyc/u1/s1/me.jpg", "/quarantine/kyc/u1/s1/me.jpg"] {
            assert!(DocumentView::new(document(path), &quarantine).quarantined, "{path}");
        }
        for path in ["kyc/u1/s1/me.jpg", "quarantined/kyc/me.jpg"] {
            assert!(!DocumentView::new(document(path), &quarantine).quarantined, "{path}");
        }
    }
}
