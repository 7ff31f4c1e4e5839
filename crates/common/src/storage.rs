//! Disk abstraction for private document storage.
//!
//! Files are addressed by a disk name plus a relative path. Local disks can
//! resolve a path to an absolute filesystem location, which the antivirus
//! scanner needs; object storage disks cannot.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::config::StorageSettings;
use crate::{AppError, AppResult};

/// Storage disk configuration, tagged by `driver`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Local {
        /// Root directory of the disk.
        root: PathBuf,
    },
    /// S3-compatible object storage.
    S3 {
        /// S3 endpoint URL (e.g., "<https://s3.amazonaws.com>" or `MinIO` URL).
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// AWS region.
        region: String,
        /// Access key ID.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Path prefix within the bucket.
        #[serde(default)]
        prefix: Option<String>,
    },
}

/// Storage backend trait.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write a file, creating intermediate directories as needed.
    async fn put(&self, path: &str, data: &[u8]) -> AppResult<()>;

    /// Delete a file. Deleting a missing file is not an error.
    async fn delete(&self, path: &str) -> AppResult<()>;

    /// Check if a file exists.
    async fn exists(&self, path: &str) -> AppResult<bool>;

    /// Move a file to another path on the same disk.
    async fn move_to(&self, from: &str, to: &str) -> AppResult<()>;

    /// Absolute filesystem path for `path`, or `None` when the disk is not
    /// locally addressable.
    fn local_path(&self, path: &str) -> Option<PathBuf>;
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend rooted at `root`.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Join `path` onto the root, refusing absolute paths and `..` segments.
    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes || path.is_empty() {
            return Err(AppError::Storage(format!("Invalid storage path: {path}")));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn put(&self, path: &str, data: &[u8]) -> AppResult<()> {
        let full = self.resolve(path)?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&full, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            tokio::fs::remove_file(&full)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to delete file: {e}")))?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to stat file: {e}")))
    }

    async fn move_to(&self, from: &str, to: &str) -> AppResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to move file: {e}")))
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok()
    }
}

/// S3-compatible object storage backend.
#[cfg(feature = "s3")]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
}

#[cfg(feature = "s3")]
impl S3Storage {
    /// Create a new S3 storage backend.
    pub fn new(
        endpoint: &str,
        bucket: String,
        region: &str,
        access_key_id: &str,
        secret_access_key: &str,
        prefix: Option<String>,
    ) -> Self {
        use aws_config::Region;
        use aws_sdk_s3::config::Credentials;

        let credentials =
            Credentials::new(access_key_id, secret_access_key, None, None, "kyc-vault");

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket,
            prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }
}

#[cfg(feature = "s3")]
#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn put(&self, path: &str, data: &[u8]) -> AppResult<()> {
        use aws_sdk_s3::primitives::ByteStream;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;

        Ok(())
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(path))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(AppError::Storage(format!("S3 head_object failed: {e}")))
                }
            }
        }
    }

    async fn move_to(&self, from: &str, to: &str) -> AppResult<()> {
        let source = format!("{}/{}", self.bucket, self.full_key(from));

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(source)
            .key(self.full_key(to))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 copy failed: {e}")))?;

        self.delete(from).await
    }

    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

/// Registry of named disks.
#[derive(Clone, Default)]
pub struct StorageManager {
    disks: HashMap<String, Arc<dyn StorageBackend>>,
}

impl StorageManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured disk.
    pub fn from_settings(settings: &StorageSettings) -> AppResult<Self> {
        let mut manager = Self::new();

        for (name, disk) in &settings.disks {
            let backend: Arc<dyn StorageBackend> = match disk {
                StorageConfig::Local { root } => Arc::new(LocalStorage::new(root.clone())),
                #[cfg(feature = "s3")]
                StorageConfig::S3 {
                    endpoint,
                    bucket,
                    region,
                    access_key_id,
                    secret_access_key,
                    prefix,
                } => Arc::new(S3Storage::new(
                    endpoint,
                    bucket.clone(),
                    region,
                    access_key_id,
                    secret_access_key,
                    prefix.clone(),
                )),
                #[cfg(not(feature = "s3"))]
                StorageConfig::S3 { .. } => {
                    return Err(AppError::Config(format!(
                        "Disk '{name}' uses the s3 driver, which requires the `s3` feature"
                    )));
                }
            };
            manager.disks.insert(name.clone(), backend);
        }

        Ok(manager)
    }

    /// Register a disk under `name`, replacing any previous one.
    #[must_use]
    pub fn with_disk(mut self, name: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        self.disks.insert(name.into(), backend);
        self
    }

    /// Look up a disk by name.
    pub fn disk(&self, name: &str) -> AppResult<Arc<dyn StorageBackend>> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("Unknown storage disk: {name}")))
    }
}

/// Generate a unique storage path for an uploaded document.
///
/// Layout: `kyc/{owner_id}/{group_id}/{stem}_{ulid}.{extension}`.
#[must_use]
pub fn generate_storage_key(owner_id: &str, group_id: &str, stem: &str, extension: &str) -> String {
    let extension = Some(extension)
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .unwrap_or("bin");

    format!(
        "kyc/{}/{}/{}_{}.{}",
        owner_id,
        group_id,
        stem,
        ulid::Ulid::new().to_string().to_lowercase(),
        extension
    )
}
