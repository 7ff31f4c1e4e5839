//! Common utilities and shared types for kyc-vault.
//!
//! This crate provides foundational components used across all kyc-vault crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Storage**: Named disks (local filesystem, S3-compatible) via [`StorageManager`]
//!
//! # Example
//!
//! ```no_run
//! use kyc_common::{AppResult, Config, StorageManager};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let storage = StorageManager::from_settings(&config.storage)?;
//!     let disk = storage.disk(&config.kyc.disk)?;
//!     println!("Local root: {:?}", disk.local_path("."));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod storage;

pub use config::{Config, KycConfig};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use storage::{
    LocalStorage, StorageBackend, StorageConfig, StorageManager, generate_storage_key,
};
