//! User entity.
//!
//! The user table belongs to the host application; this model covers the
//! columns the KYC pipeline reads (authentication, roles) and the
//! verification fields it cascades into.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Identity verification status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum KycStatus {
    #[sea_orm(string_value = "none")]
    #[serde(rename = "none")]
    #[default]
    Unverified,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    /// Access token
    #[sea_orm(unique, nullable)]
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Is administrator?
    #[sea_orm(default_value = false)]
    pub is_admin: bool,

    /// Is moderator?
    #[sea_orm(default_value = false)]
    pub is_moderator: bool,

    /// Identity verification status
    pub kyc_status: KycStatus,

    /// When the identity was verified (set only while approved)
    #[sea_orm(nullable)]
    pub kyc_verified_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the user may review KYC submissions.
    #[must_use]
    pub const fn can_review_kyc(&self) -> bool {
        self.is_admin || self.is_moderator
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::kyc_submission::Entity")]
    KycSubmission,
}

impl Related<super::kyc_submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KycSubmission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
