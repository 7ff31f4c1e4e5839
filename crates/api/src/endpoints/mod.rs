//! API endpoints.

mod admin;
mod kyc;

use axum::Router;
use kyc_common::config::KycConfig;
use kyc_db::entities::kyc_document::DocType;

use crate::middleware::AppState;

/// Multipart framing allowance on top of the document bytes.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/kyc", kyc::router())
        .nest("/admin/kyc", admin::router())
}

/// Request body limit for a submission carrying every document type at
/// the maximum file size.
#[must_use]
pub fn upload_body_limit(config: &KycConfig) -> usize {
    let per_file = usize::try_from(config.max_file_size_bytes()).unwrap_or(usize::MAX);
    per_file
        .saturating_mul(DocType::ALL.len())
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
}
