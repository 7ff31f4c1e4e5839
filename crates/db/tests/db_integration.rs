//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance and share one
//! database, so run them serially:
//! `cargo test --test db_integration -- --ignored --test-threads=1`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `kyc_test`)
//!   `TEST_DB_PASSWORD` (default: `kyc_test`)
//!   `TEST_DB_NAME` (default: `kyc_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use kyc_db::{
    entities::{
        kyc_document::{self, AvStatus, DocType},
        kyc_submission::{self, SubmissionStatus},
        user::{self, KycStatus},
    },
    repositories::{KycDocumentRepository, KycSubmissionRepository, UserRepository},
    test_utils::{TestDatabase, TestDbConfig},
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel};

async fn setup() -> Arc<DatabaseConnection> {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.expect("Failed to clean up");
    Arc::new(db.conn)
}

async fn insert_user(db: &DatabaseConnection, id: &str, token: &str) {
    let model = user::Model {
        id: id.to_string(),
        username: id.to_string(),
        token: Some(token.to_string()),
        is_admin: false,
        is_moderator: false,
        kyc_status: KycStatus::Pending,
        kyc_verified_at: None,
        created_at: Utc::now().into(),
        updated_at: None,
    };
    user::Entity::insert(model.into_active_model().reset_all())
        .exec_without_returning(db)
        .await
        .unwrap();
}

async fn insert_submission(
    db: &DatabaseConnection,
    id: &str,
    status: SubmissionStatus,
    purge_after: Option<Duration>,
) {
    let model = kyc_submission::Model {
        id: id.to_string(),
        user_id: "user1".to_string(),
        status,
        submitted_at: Utc::now().into(),
        reviewed_at: None,
        reviewer_id: None,
        reviewer_note: None,
        purge_after: purge_after.map(|offset| (Utc::now() + offset).into()),
    };
    kyc_submission::Entity::insert(model.into_active_model().reset_all())
        .exec_without_returning(db)
        .await
        .unwrap();
}

async fn insert_document(db: &DatabaseConnection, id: &str, submission_id: &str, age: Duration) {
    let model = kyc_document::Model {
        id: id.to_string(),
        submission_id: submission_id.to_string(),
        user_id: "user1".to_string(),
        doc_type: DocType::IdFront,
        original_name: "front.jpg".to_string(),
        declared_mime: "image/jpeg".to_string(),
        detected_mime: "image/jpeg".to_string(),
        size: 10,
        disk: "local".to_string(),
        path: format!("kyc/user1/{submission_id}/{id}.jpg"),
        av_status: AvStatus::Pending,
        av_scanned_at: None,
        av_message: None,
        created_at: (Utc::now() - age).into(),
    };
    kyc_document::Entity::insert(model.into_active_model().reset_all())
        .exec_without_returning(db)
        .await
        .unwrap();
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(config.database_url().starts_with("postgres://"));
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_find_by_token() {
    let db = setup().await;
    insert_user(&db, "user1", "secret").await;

    let repo = UserRepository::new(db);
    let found = repo.find_by_token("secret").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some("user1".to_string()));
    assert!(repo.find_by_token("other").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_purgeable_requires_expiry_and_documents() {
    let db = setup().await;
    insert_user(&db, "user1", "secret").await;
    insert_submission(&db, "sub1", SubmissionStatus::Approved, Some(-Duration::days(1))).await;
    insert_submission(&db, "sub2", SubmissionStatus::Rejected, Some(Duration::days(1))).await;
    insert_submission(&db, "sub3", SubmissionStatus::Approved, Some(-Duration::days(2))).await;
    insert_submission(&db, "sub4", SubmissionStatus::Pending, None).await;
    insert_document(&db, "doc1", "sub1", Duration::zero()).await;
    insert_document(&db, "doc2", "sub2", Duration::zero()).await;
    insert_document(&db, "doc4", "sub4", Duration::zero()).await;

    let repo = KycSubmissionRepository::new(db);
    let purgeable = repo.find_purgeable(Utc::now(), None, 10).await.unwrap();

    let ids: Vec<_> = purgeable.into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["sub1".to_string()]);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_purgeable_keyset_pagination() {
    let db = setup().await;
    insert_user(&db, "user1", "secret").await;
    for id in ["sub_a", "sub_b"] {
        insert_submission(&db, id, SubmissionStatus::Approved, Some(-Duration::days(1))).await;
        insert_document(&db, &format!("{id}_doc"), id, Duration::zero()).await;
    }

    let repo = KycSubmissionRepository::new(db);
    let first = repo.find_purgeable(Utc::now(), None, 1).await.unwrap();
    assert_eq!(first[0].id, "sub_a");

    let second = repo
        .find_purgeable(Utc::now(), Some(&first[0].id), 1)
        .await
        .unwrap();
    assert_eq!(second[0].id, "sub_b");

    let rest = repo
        .find_purgeable(Utc::now(), Some(&second[0].id), 1)
        .await
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_stale_pending_documents() {
    let db = setup().await;
    insert_user(&db, "user1", "secret").await;
    insert_submission(&db, "sub1", SubmissionStatus::Pending, None).await;
    insert_document(&db, "old", "sub1", Duration::hours(3)).await;
    insert_document(&db, "new", "sub1", Duration::zero()).await;

    let repo = KycDocumentRepository::new(db);
    let stale = repo
        .find_stale_pending(Utc::now() - Duration::hours(1), 10)
        .await
        .unwrap();

    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, "old");
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_deleting_submission_cascades_to_documents() {
    let db = setup().await;
    insert_user(&db, "user1", "secret").await;
    insert_submission(&db, "sub1", SubmissionStatus::Withdrawn, None).await;
    insert_document(&db, "doc1", "sub1", Duration::zero()).await;

    kyc_submission::Entity::delete_by_id("sub1")
        .exec(db.as_ref())
        .await
        .unwrap();

    let docs = KycDocumentRepository::new(db).find_by_submission("sub1").await.unwrap();
    assert!(docs.is_empty());
}
