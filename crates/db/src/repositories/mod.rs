//! Database repositories.

mod kyc_document;
mod kyc_submission;
mod user;

pub use kyc_document::KycDocumentRepository;
pub use kyc_submission::KycSubmissionRepository;
pub use user::UserRepository;
