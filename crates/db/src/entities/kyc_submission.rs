//! KYC submission entity: one review unit owning a set of documents.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SubmissionStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "withdrawn")]
    Withdrawn,
    #[sea_orm(string_value = "quarantined")]
    Quarantined,
}

/// Events that move a submission out of its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionEvent {
    /// Reviewer accepted the documents.
    Approve,
    /// Reviewer refused the documents.
    Reject,
    /// Administrative deletion of the documents.
    Redact,
    /// Antivirus scan found an infected document.
    Quarantine,
}

impl SubmissionStatus {
    /// Status names, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Withdrawn,
        Self::Quarantined,
    ];

    /// Status after `event`, or `None` when the event is not allowed.
    ///
    /// Approve, reject and quarantine only leave `pending`; redact is an
    /// administrative override accepted from every status.
    #[must_use]
    pub const fn apply(self, event: SubmissionEvent) -> Option<Self> {
        match (self, event) {
            (Self::Pending, SubmissionEvent::Approve) => Some(Self::Approved),
            (Self::Pending, SubmissionEvent::Reject) => Some(Self::Rejected),
            (Self::Pending, SubmissionEvent::Quarantine) => Some(Self::Quarantined),
            (_, SubmissionEvent::Redact) => Some(Self::Withdrawn),
            (
                Self::Approved | Self::Rejected | Self::Withdrawn | Self::Quarantined,
                SubmissionEvent::Approve | SubmissionEvent::Reject | SubmissionEvent::Quarantine,
            ) => None,
        }
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Quarantined => "quarantined",
        }
    }

    /// Parse a stored status name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

/// KYC submission.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kyc_submission")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Current review status
    pub status: SubmissionStatus,

    /// When the user completed intake
    pub submitted_at: DateTimeWithTimeZone,

    /// When the submission left `pending`
    #[sea_orm(nullable)]
    pub reviewed_at: Option<DateTimeWithTimeZone>,

    /// Reviewer (admin or moderator)
    #[sea_orm(nullable)]
    pub reviewer_id: Option<String>,

    /// Free-text reviewer note, also used for automated quarantine notes
    #[sea_orm(column_type = "Text", nullable)]
    pub reviewer_note: Option<String>,

    /// Documents become eligible for the retention purge after this instant
    #[sea_orm(nullable)]
    pub purge_after: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::kyc_document::Entity")]
    KycDocument,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::kyc_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KycDocument.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        let pending = SubmissionStatus::Pending;

        assert_eq!(pending.apply(SubmissionEvent::Approve), Some(SubmissionStatus::Approved));
        assert_eq!(pending.apply(SubmissionEvent::Reject), Some(SubmissionStatus::Rejected));
        assert_eq!(
            pending.apply(SubmissionEvent::Quarantine),
            Some(SubmissionStatus::Quarantined)
        );
        assert_eq!(pending.apply(SubmissionEvent::Redact), Some(SubmissionStatus::Withdrawn));
    }

    #[test]
    fn test_terminal_statuses_only_accept_redact() {
        let reviewed = SubmissionStatus::ALL
            .into_iter()
            .filter(|s| *s != SubmissionStatus::Pending);
        for status in reviewed {
            assert_eq!(status.apply(SubmissionEvent::Approve), None);
            assert_eq!(status.apply(SubmissionEvent::Reject), None);
            assert_eq!(status.apply(SubmissionEvent::Quarantine), None);
            assert_eq!(status.apply(SubmissionEvent::Redact), Some(SubmissionStatus::Withdrawn));
        }
    }

    #[test]
    fn test_parse_round_trips_names() {
        assert_eq!(SubmissionStatus::parse("quarantined"), Some(SubmissionStatus::Quarantined));
        assert_eq!(SubmissionStatus::parse("deleted"), None);
    }
}
