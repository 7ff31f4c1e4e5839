//! API integration tests.
//!
//! The router runs against a mock database and a temporary local disk.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::DefaultBodyLimit,
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use kyc_api::{AppState, auth_middleware, router as api_router, upload_body_limit};
use kyc_common::{
    config::KycConfig,
    storage::{LocalStorage, StorageManager},
};
use kyc_core::{KycIntakeService, KycReviewService, NoOpScanQueue};
use kyc_db::{
    entities::{
        kyc_submission::{self, SubmissionStatus},
        user::{self, KycStatus},
    },
    repositories::UserRepository,
};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "kyc-test-boundary";

fn user(id: &str, token: &str, is_admin: bool) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: id.to_string(),
        token: Some(token.to_string()),
        is_admin,
        is_moderator: false,
        kyc_status: KycStatus::Unverified,
        kyc_verified_at: None,
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn submission(status: SubmissionStatus) -> kyc_submission::Model {
    kyc_submission::Model {
        id: "sub1".to_string(),
        user_id: "user1".to_string(),
        status,
        submitted_at: Utc::now().into(),
        reviewed_at: None,
        reviewer_id: None,
        reviewer_note: None,
        purge_after: None,
    }
}

/// Build the application router over `db`.
fn create_app(db: MockDatabase) -> Router {
    let db = Arc::new(db.into_connection());
    let root = std::env::temp_dir().join(format!("kyc-api-{}", ulid::Ulid::new()));
    let storage =
        Arc::new(StorageManager::new().with_disk("local", Arc::new(LocalStorage::new(root))));
    let config = KycConfig::default();

    let state = AppState {
        user_repo: UserRepository::new(Arc::clone(&db)),
        intake_service: KycIntakeService::new(
            Arc::clone(&db),
            Arc::clone(&storage),
            Arc::new(NoOpScanQueue),
            &config,
        ),
        review_service: KycReviewService::new(db, storage, &config),
    };

    api_router()
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(DefaultBodyLimit::max(upload_body_limit(&config)))
        .with_state(state)
}

fn json_request(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Multipart body with one file part per `(field, filename, content_type, bytes)`.
fn multipart_request(token: &str, parts: &[(&str, &str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, filename, content_type, data) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/kyc/submit")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_status_without_token_is_unauthorized() {
    let app = create_app(MockDatabase::new(DatabaseBackend::Postgres));

    let response = app
        .oneshot(json_request("/kyc/status", None, "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<user::Model>::new()]);
    let app = create_app(db);

    let response = app
        .oneshot(json_request("/kyc/status", Some("nope"), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_for_user_without_submission() {
    let alice = user("user1", "alice-token", false);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[alice.clone()]])
        .append_query_results([[alice]])
        .append_query_results([Vec::<kyc_submission::Model>::new()]);
    let app = create_app(db);

    let response = app
        .oneshot(json_request("/kyc/status", Some("alice-token"), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["kycStatus"], "none");
    assert!(body["data"]["latestSubmission"].is_null());
}

#[tokio::test]
async fn test_submit_without_selfie_names_the_field() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("user1", "alice-token", false)]]);
    let app = create_app(db);

    let jpeg: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    let pdf: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
    let request = multipart_request(
        "alice-token",
        &[
            ("id_front", "front.jpg", "image/jpeg", jpeg),
            ("proof_of_address", "bill.pdf", "application/pdf", pdf),
        ],
    );

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "documents.selfie");
}

#[tokio::test]
async fn test_submit_rejects_pdf_named_jpg_sent_as_octet_stream() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("user1", "alice-token", false)]]);
    let app = create_app(db);

    let jpeg: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    let pdf: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
    let request = multipart_request(
        "alice-token",
        &[
            ("id_front", "front.jpg", "application/octet-stream", pdf),
            ("selfie", "me.jpg", "image/jpeg", jpeg),
            ("proof_of_address", "bill.pdf", "application/pdf", pdf),
        ],
    );

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["field"], "documents.id_front");
    assert!(body["error"]["message"].as_str().unwrap().contains("type mismatch"));
}

#[tokio::test]
async fn test_submit_rejects_unknown_document_part() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("user1", "alice-token", false)]]);
    let app = create_app(db);

    let request = multipart_request(
        "alice-token",
        &[("passport", "passport.png", "image/png", &b"\x89PNG\r\n\x1a\n"[..])],
    );

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["field"], "documents.passport");
}

#[tokio::test]
async fn test_admin_routes_require_reviewer() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("user1", "alice-token", false)]]);
    let app = create_app(db);

    let response = app
        .oneshot(json_request("/admin/kyc/list", Some("alice-token"), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_list_rejects_oversized_limit() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("admin1", "admin-token", true)]]);
    let app = create_app(db);

    let response = app
        .oneshot(json_request(
            "/admin/kyc/list",
            Some("admin-token"),
            r#"{"limit": 500}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_approve_reviewed_submission_conflicts() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("admin1", "admin-token", true)]])
        .append_query_results([[submission(SubmissionStatus::Rejected)]]);
    let app = create_app(db);

    let response = app
        .oneshot(json_request(
            "/admin/kyc/approve",
            Some("admin-token"),
            r#"{"submissionId": "sub1", "note": "looks fine"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_show_missing_submission_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[user("admin1", "admin-token", true)]])
        .append_query_results([Vec::<kyc_submission::Model>::new()]);
    let app = create_app(db);

    let response = app
        .oneshot(json_request(
            "/admin/kyc/show",
            Some("admin-token"),
            r#"{"submissionId": "missing"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = create_app(MockDatabase::new(DatabaseBackend::Postgres));

    let response = app
        .oneshot(json_request("/nonexistent", None, "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
