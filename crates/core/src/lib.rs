//! Core business logic for kyc-vault.
//!
//! Intake validation, antivirus scanning, quarantine, admin review and
//! retention purge of identity documents.

pub mod services;

pub use services::*;
