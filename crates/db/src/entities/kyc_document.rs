//! KYC document entity: one uploaded identity file.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of identity document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    #[sea_orm(string_value = "id_front")]
    IdFront,
    #[sea_orm(string_value = "id_back")]
    IdBack,
    #[sea_orm(string_value = "selfie")]
    Selfie,
    #[sea_orm(string_value = "proof_of_address")]
    ProofOfAddress,
}

impl DocType {
    /// Every document type.
    pub const ALL: [Self; 4] = [Self::IdFront, Self::IdBack, Self::Selfie, Self::ProofOfAddress];

    /// Types every submission must contain.
    pub const REQUIRED: [Self; 3] = [Self::IdFront, Self::Selfie, Self::ProofOfAddress];

    /// Name used in storage paths and request fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdFront => "id_front",
            Self::IdBack => "id_back",
            Self::Selfie => "selfie",
            Self::ProofOfAddress => "proof_of_address",
        }
    }

    /// Parse a document type name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Whether a submission is incomplete without this type.
    #[must_use]
    pub const fn is_required(self) -> bool {
        !matches!(self, Self::IdBack)
    }
}

/// Antivirus scan status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum AvStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "clean")]
    Clean,
    #[sea_orm(string_value = "infected")]
    Infected,
    #[sea_orm(string_value = "error")]
    Error,
}

impl AvStatus {
    /// Whether a scan verdict has been recorded.
    #[must_use]
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Status after recording `verdict`, or `None` when a verdict already
    /// exists or `verdict` is not a verdict.
    #[must_use]
    pub const fn record(self, verdict: Self) -> Option<Self> {
        match (self, verdict) {
            (Self::Pending, Self::Clean | Self::Infected | Self::Error) => Some(verdict),
            (Self::Pending, Self::Pending) => None,
            (Self::Clean | Self::Infected | Self::Error, _) => None,
        }
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Clean => "clean",
            Self::Infected => "infected",
            Self::Error => "error",
        }
    }
}

/// KYC document.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kyc_document")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning submission
    pub submission_id: String,

    /// Owning user (denormalized for ownership checks)
    pub user_id: String,

    pub doc_type: DocType,

    /// File name as sent by the client
    pub original_name: String,

    /// MIME type declared by the client
    pub declared_mime: String,

    /// MIME type detected from the file's leading bytes
    pub detected_mime: String,

    /// File size in bytes
    pub size: i64,

    /// Storage disk name
    pub disk: String,

    /// Path on the disk (moves under the quarantine prefix when infected)
    pub path: String,

    pub av_status: AvStatus,

    #[sea_orm(nullable)]
    pub av_scanned_at: Option<DateTimeWithTimeZone>,

    /// Threat name for infected files, cause for scan errors
    #[sea_orm(column_type = "Text", nullable)]
    pub av_message: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::kyc_submission::Entity",
        from = "Column::SubmissionId",
        to = "super::kyc_submission::Column::Id",
        on_delete = "Cascade"
    )]
    KycSubmission,
}

impl Related<super::kyc_submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KycSubmission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
