//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::bucket::DEFAULT_WIDTH_SECS;
use crate::error::Error;
use crate::pipeline::MalformedPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bucket: BucketConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub iterate: IterateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bucketing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Bucket width in seconds
    #[serde(default = "default_width")]
    pub width: i64,
}

fn default_width() -> i64 {
    DEFAULT_WIDTH_SECS
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
        }
    }
}

/// Which store implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown store backend: {}",
                other
            ))),
        }
    }
}

/// Bucket store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Database file (sqlite backend only)
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Bucket ids returned per index scan page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Ids repeated from the previous scan page (memory backend only)
    #[serde(default)]
    pub scan_overlap: usize,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_store_path() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("linkbucket")
                .join("buckets.db")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./linkbucket_data/buckets.db".to_string())
}

fn default_page_size() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            page_size: default_page_size(),
            scan_overlap: 0,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.page_size == 0 {
            return Err(Error::InvalidConfiguration(
                "store.page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Clear the store before ingesting
    #[serde(default = "default_reset_on_start")]
    pub reset_on_start: bool,

    /// Events written to the store concurrently
    #[serde(default = "default_ingest_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub on_malformed: MalformedPolicy,
}

fn default_reset_on_start() -> bool {
    true
}

fn default_ingest_concurrency() -> usize {
    16
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            reset_on_start: default_reset_on_start(),
            concurrency: default_ingest_concurrency(),
            on_malformed: MalformedPolicy::default(),
        }
    }
}

/// Result iteration configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IterateConfig {
    /// Membership lookups issued in parallel within one scan page
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
}

fn default_lookup_concurrency() -> usize {
    8
}

impl Default for IterateConfig {
    fn default() -> Self {
        Self {
            lookup_concurrency: default_lookup_concurrency(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("linkbucket").join("config.toml")),
            Some(PathBuf::from("./linkbucket.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check values that would otherwise fail deep inside a run
    pub fn validate(&self) -> Result<(), Error> {
        if self.bucket.width <= 0 {
            return Err(Error::InvalidConfiguration(format!(
                "bucket.width must be positive, got {}",
                self.bucket.width
            )));
        }
        self.store.validate()?;
        if self.ingest.concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "ingest.concurrency must be at least 1".to_string(),
            ));
        }
        if self.iterate.lookup_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "iterate.lookup_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(width) = std::env::var("LINKBUCKET_WIDTH") {
            if let Ok(w) = width.parse() {
                self.bucket.width = w;
            }
        }

        if let Ok(backend) = std::env::var("LINKBUCKET_STORE_BACKEND") {
            match backend.parse() {
                Ok(b) => self.store.backend = b,
                Err(e) => tracing::warn!("Ignoring LINKBUCKET_STORE_BACKEND: {}", e),
            }
        }
        if let Ok(path) = std::env::var("LINKBUCKET_STORE_PATH") {
            self.store.path = path;
        }

        if let Ok(level) = std::env::var("LINKBUCKET_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LINKBUCKET_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Linkbucket Configuration
#
# Environment variables override these settings:
# - LINKBUCKET_WIDTH
# - LINKBUCKET_STORE_BACKEND
# - LINKBUCKET_STORE_PATH
# - LINKBUCKET_LOG_LEVEL
# - LINKBUCKET_LOG_FORMAT

[bucket]
# Bucket width in seconds
width = 300

[store]
# Backend: sqlite or memory
backend = "sqlite"

# Database file for the sqlite backend
path = "~/.local/share/linkbucket/buckets.db"

# Bucket ids per index scan page
page_size = 100

# Ids repeated between scan pages (memory backend, for testing)
scan_overlap = 0

[ingest]
# Clear the store before ingesting
reset_on_start = true

# Events written concurrently
concurrency = 16

# What to do with unparseable records: skip or abort
on_malformed = "skip"

[iterate]
# Membership lookups in flight per scan page
lookup_concurrency = 8

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
