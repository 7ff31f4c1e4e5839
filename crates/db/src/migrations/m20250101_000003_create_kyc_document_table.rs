//! Create `kyc_document` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KycDocument::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KycDocument::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KycDocument::SubmissionId).string_len(32).not_null())
                    .col(ColumnDef::new(KycDocument::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(KycDocument::DocType).string_len(32).not_null())
                    .col(ColumnDef::new(KycDocument::OriginalName).string_len(256).not_null())
                    .col(ColumnDef::new(KycDocument::DeclaredMime).string_len(128).not_null())
                    .col(ColumnDef::new(KycDocument::DetectedMime).string_len(128).not_null())
                    .col(ColumnDef::new(KycDocument::Size).big_integer().not_null())
                    .col(ColumnDef::new(KycDocument::Disk).string_len(64).not_null())
                    .col(ColumnDef::new(KycDocument::Path).string_len(1024).not_null())
                    .col(
                        ColumnDef::new(KycDocument::AvStatus)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(KycDocument::AvScannedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(KycDocument::AvMessage).text())
                    .col(
                        ColumnDef::new(KycDocument::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kyc_document_submission")
                            .from(KycDocument::Table, KycDocument::SubmissionId)
                            .to(KycSubmission::Table, KycSubmission::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: submission_id (documents of a submission, purge selection)
        manager
            .create_index(
                Index::create()
                    .name("idx_kyc_document_submission_id")
                    .table(KycDocument::Table)
                    .col(KycDocument::SubmissionId)
                    .to_owned(),
            )
            .await?;

        // Index: (av_status, created_at) for the stale scan report
        manager
            .create_index(
                Index::create()
                    .name("idx_kyc_document_av_status_created_at")
                    .table(KycDocument::Table)
                    .col(KycDocument::AvStatus)
                    .col(KycDocument::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KycDocument::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum KycDocument {
    Table,
    Id,
    SubmissionId,
    UserId,
    DocType,
    OriginalName,
    DeclaredMime,
    DetectedMime,
    Size,
    Disk,
    Path,
    AvStatus,
    AvScannedAt,
    AvMessage,
    CreatedAt,
}

#[derive(Iden)]
enum KycSubmission {
    Table,
    Id,
}
