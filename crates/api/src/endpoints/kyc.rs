//! Identity verification endpoints for the signed-in user.

use axum::{
    Router,
    extract::{Multipart, State, multipart::Field},
    routing::post,
};
use kyc_common::{AppError, AppResult};
use kyc_core::{KycStatusView, SubmissionView, UploadedDocument};
use kyc_db::entities::kyc_document::DocType;

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{ApiResponse, Created},
};

/// Submit identity documents.
///
/// Multipart form with one file part per document type, named `id_front`,
/// `id_back`, `selfie` and `proof_of_address`.
async fn submit(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Created<SubmissionView>> {
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        documents.push(read_document(field).await?);
    }

    let submission = state.intake_service.submit(&user.id, documents).await?;
    Ok(ApiResponse::created(submission))
}

async fn read_document(field: Field<'_>) -> AppResult<UploadedDocument> {
    let name = field.name().unwrap_or_default().to_string();
    let Some(doc_type) = DocType::parse(&name) else {
        return Err(AppError::invalid_field(
            format!("documents.{name}"),
            "unknown document type",
        ));
    };

    let original_name = field.file_name().unwrap_or_default().to_string();
    let declared_mime = field.content_type().unwrap_or_default().to_string();
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
        .to_vec();

    Ok(UploadedDocument {
        doc_type,
        original_name,
        declared_mime,
        data,
    })
}

/// Verification status of the signed-in user.
async fn status(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<KycStatusView>> {
    let status = state.review_service.status_for_user(&user.id).await?;
    Ok(ApiResponse::ok(status))
}

/// Create the KYC router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/status", post(status))
}
