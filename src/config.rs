use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub ocr: OcrConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

/// OCR backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Base URL of the OCR backend (recognize + health endpoints)
    pub endpoint: String,
    #[serde(default = "default_inline_timeout_secs")]
    pub inline_timeout_secs: u64,
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
    /// Payloads up to this size use the inline timeout budget
    #[serde(default = "default_inline_threshold_bytes")]
    pub inline_threshold_bytes: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

/// Upload validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: usize,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_inline_timeout_secs() -> u64 {
    5
}

fn default_file_timeout_secs() -> u64 {
    30
}

fn default_inline_threshold_bytes() -> usize {
    256 * 1024
}

fn default_max_retries() -> usize {
    2
}

fn default_max_size_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        "application/pdf",
        "image/jpeg",
        "image/png",
        "image/tiff",
        "image/gif",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in BOLINGEST_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("BOLINGEST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.ocr.endpoint.is_empty() {
            anyhow::bail!("ocr.endpoint must be set to the OCR backend base URL");
        }

        if self.ocr.inline_timeout_secs == 0 || self.ocr.file_timeout_secs == 0 {
            anyhow::bail!("ocr timeouts must be greater than 0 seconds");
        }

        if self.ocr.file_timeout_secs < self.ocr.inline_timeout_secs {
            anyhow::bail!(
                "ocr.file_timeout_secs ({}) must be at least ocr.inline_timeout_secs ({})",
                self.ocr.file_timeout_secs,
                self.ocr.inline_timeout_secs
            );
        }

        // One uniform retry policy: single attempt plus at most 2 retries
        if self.ocr.max_retries > 2 {
            anyhow::bail!("ocr.max_retries must be 2 or fewer");
        }

        if self.uploads.max_size_bytes == 0 {
            anyhow::bail!("uploads.max_size_bytes must be greater than 0");
        }

        if self.uploads.allowed_mime_types.is_empty() {
            anyhow::bail!("uploads.allowed_mime_types must not be empty");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.storage.db_path
    }
}
