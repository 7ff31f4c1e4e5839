//! Create `kyc_submission` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KycSubmission::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KycSubmission::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KycSubmission::UserId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(KycSubmission::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(KycSubmission::SubmittedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(KycSubmission::ReviewedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(KycSubmission::ReviewerId).string_len(32))
                    .col(ColumnDef::new(KycSubmission::ReviewerNote).text())
                    .col(ColumnDef::new(KycSubmission::PurgeAfter).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kyc_submission_user")
                            .from(KycSubmission::Table, KycSubmission::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, status) for the one-pending-submission check
        manager
            .create_index(
                Index::create()
                    .name("idx_kyc_submission_user_status")
                    .table(KycSubmission::Table)
                    .col(KycSubmission::UserId)
                    .col(KycSubmission::Status)
                    .to_owned(),
            )
            .await?;

        // Index: status (admin review queue)
        manager
            .create_index(
                Index::create()
                    .name("idx_kyc_submission_status")
                    .table(KycSubmission::Table)
                    .col(KycSubmission::Status)
                    .to_owned(),
            )
            .await?;

        // Index: purge_after (retention sweep)
        manager
            .create_index(
                Index::create()
                    .name("idx_kyc_submission_purge_after")
                    .table(KycSubmission::Table)
                    .col(KycSubmission::PurgeAfter)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KycSubmission::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum KycSubmission {
    Table,
    Id,
    UserId,
    Status,
    SubmittedAt,
    ReviewedAt,
    ReviewerId,
    ReviewerNote,
    PurgeAfter,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
