//! Application configuration.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::storage::StorageConfig;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Storage disks.
    #[serde(default)]
    pub storage: StorageSettings,
    /// KYC pipeline configuration.
    #[serde(default)]
    pub kyc: KycConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Named storage disks.
///
/// ```toml
/// [storage.disks.local]
/// driver = "local"
/// root = "/var/lib/kyc/files"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Disk configurations keyed by disk name.
    #[serde(default = "default_disks")]
    pub disks: HashMap<String, StorageConfig>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            disks: default_disks(),
        }
    }
}

/// KYC intake, scanning and retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KycConfig {
    /// Whether uploaded documents are scanned at all.
    #[serde(default = "default_true")]
    pub av_scan_enabled: bool,
    /// Scanner executable, invoked with a single file path argument.
    #[serde(default = "default_clamscan_binary")]
    pub clamscan_binary: String,
    /// Scanner timeout in seconds.
    #[serde(default = "default_clamscan_timeout")]
    pub clamscan_timeout: u64,
    /// MIME types accepted after byte sniffing.
    #[serde(default = "default_allowed_magic_mimes")]
    pub allowed_magic_mimes: Vec<String>,
    /// Maximum upload size per file, in KiB.
    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: u64,
    /// Disk that receives new uploads.
    #[serde(default = "default_disk")]
    pub disk: String,
    /// Path prefix for quarantined files on the same disk.
    #[serde(default = "default_quarantine_prefix")]
    pub quarantine_prefix: String,
    /// Days a reviewed submission keeps its documents.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Delivery attempts per scan job.
    #[serde(default = "default_scan_max_attempts")]
    pub scan_max_attempts: u32,
    /// Fixed delay between scan job attempts, in seconds.
    #[serde(default = "default_scan_backoff_secs")]
    pub scan_backoff_secs: u64,
    /// Submissions handled per purge batch.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: u64,
    /// Interval of the scheduled purge, in seconds.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    /// Age after which a pending scan is reported as stale, in minutes.
    #[serde(default = "default_stale_scan_minutes")]
    pub stale_scan_minutes: i64,
}

impl Default for KycConfig {
    fn default() -> Self {
        Self {
            av_scan_enabled: true,
            clamscan_binary: default_clamscan_binary(),
            clamscan_timeout: default_clamscan_timeout(),
            allowed_magic_mimes: default_allowed_magic_mimes(),
            max_file_size_kb: default_max_file_size_kb(),
            disk: default_disk(),
            quarantine_prefix: default_quarantine_prefix(),
            retention_days: default_retention_days(),
            scan_max_attempts: default_scan_max_attempts(),
            scan_backoff_secs: default_scan_backoff_secs(),
            purge_batch_size: default_purge_batch_size(),
            purge_interval_secs: default_purge_interval_secs(),
            stale_scan_minutes: default_stale_scan_minutes(),
        }
    }
}

impl KycConfig {
    /// Maximum upload size per file, in bytes.
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_kb * 1024
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_redis_prefix() -> String {
    "kyc".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_disks() -> HashMap<String, StorageConfig> {
    HashMap::from([(
        default_disk(),
        StorageConfig::Local {
            root: PathBuf::from("./storage/private"),
        },
    )])
}

fn default_clamscan_binary() -> String {
    "clamscan".to_string()
}

const fn default_clamscan_timeout() -> u64 {
    60
}

fn default_allowed_magic_mimes() -> Vec<String> {
    ["image/jpeg", "image/png", "image/webp", "application/pdf"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_max_file_size_kb() -> u64 {
    10 * 1024
}

fn default_disk() -> String {
    "local".to_string()
}

fn default_quarantine_prefix() -> String {
    "quarantine".to_string()
}

const fn default_retention_days() -> i64 {
    90
}

const fn default_scan_max_attempts() -> u32 {
    3
}

const fn default_scan_backoff_secs() -> u64 {
    30
}

const fn default_purge_batch_size() -> u64 {
    100
}

const fn default_purge_interval_secs() -> u64 {
    86_400
}

const fn default_stale_scan_minutes() -> i64 {
    60
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, via `dotenvy`)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `KYC_ENV`)
    /// 4. Environment variables with `KYC__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("KYC_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("KYC")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kyc.allowed_magic_mimes")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("KYC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
