//! Database entities.

pub mod kyc_document;
pub mod kyc_submission;
pub mod user;

pub use kyc_document::Entity as KycDocument;
pub use kyc_submission::Entity as KycSubmission;
pub use user::Entity as User;
