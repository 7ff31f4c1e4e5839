//! KYC review endpoints (admins and moderators).

use axum::{Json, Router, extract::State, routing::post};
use kyc_common::AppResult;
use kyc_core::SubmissionView;
use kyc_db::entities::kyc_submission::SubmissionStatus;
use serde::Deserialize;
use validator::Validate;

use crate::{extractors::AdminUser, middleware::AppState, response::ApiResponse};

/// List submissions request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListSubmissionsRequest {
    #[serde(default)]
    pub status: Option<SubmissionStatus>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

const fn default_limit() -> u64 {
    10
}

/// Single submission request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowSubmissionRequest {
    pub submission_id: String,
}

/// Review decision request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmissionRequest {
    pub submission_id: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/// List submissions, newest first.
async fn list_submissions(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ListSubmissionsRequest>,
) -> AppResult<ApiResponse<Vec<SubmissionView>>> {
    req.validate()?;

    let submissions = state
        .review_service
        .list_submissions(req.status, req.limit, req.offset)
        .await?;

    Ok(ApiResponse::ok(submissions))
}

/// Show one submission with its documents.
async fn show_submission(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ShowSubmissionRequest>,
) -> AppResult<ApiResponse<SubmissionView>> {
    let submission = state.review_service.get_submission(&req.submission_id).await?;
    Ok(ApiResponse::ok(submission))
}

/// Approve a pending submission.
async fn approve_submission(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ReviewSubmissionRequest>,
) -> AppResult<ApiResponse<SubmissionView>> {
    req.validate()?;

    let submission = state
        .review_service
        .approve(&req.submission_id, &admin.id, req.note.as_deref())
        .await?;

    Ok(ApiResponse::ok(submission))
}

/// Reject a pending submission.
async fn reject_submission(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ReviewSubmissionRequest>,
) -> AppResult<ApiResponse<SubmissionView>> {
    req.validate()?;

    let submission = state
        .review_service
        .reject(&req.submission_id, &admin.id, req.note.as_deref())
        .await?;

    Ok(ApiResponse::ok(submission))
}

/// Delete a submission's files and withdraw it.
async fn redact_submission(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<ReviewSubmissionRequest>,
) -> AppResult<ApiResponse<SubmissionView>> {
    req.validate()?;

    let submission = state
        .review_service
        .redact(&req.submission_id, &admin.id, req.note.as_deref())
        .await?;

    Ok(ApiResponse::ok(submission))
}

/// Create the admin KYC router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/list", post(list_submissions))
        .route("/show", post(show_submission))
        .route("/approve", post(approve_submission))
        .route("/reject", post(reject_submission))
        .route("/redact", post(redact_submission))
}
