use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::AdScreenError;

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_MAX_ARCHIVE_IDS: i64 = 200;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_GCS_BUCKET: &str = "facebook_ad_images";

/// TOML-backed run configuration. Secrets stay as env vars (see `AppConfig`).
///
/// Every section is optional; a missing file or section falls back to the
/// defaults above.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub limits: LimitsConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LimitsConfig {
    pub batch_size: usize,
    /// `-1` processes every archive ID still missing an image.
    pub max_archive_ids: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_archive_ids: DEFAULT_MAX_ARCHIVE_IDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub snapshot_base_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            snapshot_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Width of the per-chunk worker pool. `1` is fully sequential.
    pub concurrency: usize,
    /// Fraction of a chunk that must resolve to not-found before the run is
    /// treated as systemically broken (e.g. expired access token).
    pub systemic_failure_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            systemic_failure_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    Fs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    /// Root directory for the `fs` backend.
    pub root: PathBuf,
    /// Prefix for public URLs returned by the `fs` backend.
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Gcs,
            bucket: DEFAULT_GCS_BUCKET.to_string(),
            root: PathBuf::from("./ad_images"),
            public_base_url: None,
        }
    }
}

impl FileConfig {
    /// `None` means unbounded.
    pub fn max_archive_ids(&self) -> Option<i64> {
        match self.limits.max_archive_ids {
            -1 => None,
            n => Some(n),
        }
    }

    pub fn validate(&self) -> Result<(), AdScreenError> {
        if self.limits.batch_size == 0 {
            return Err(AdScreenError::Config("limits.batch_size must be >= 1".into()));
        }
        if self.limits.max_archive_ids == 0 || self.limits.max_archive_ids < -1 {
            return Err(AdScreenError::Config(format!(
                "limits.max_archive_ids must be >= 1 or -1, got {}",
                self.limits.max_archive_ids
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(AdScreenError::Config("http.timeout_secs must be >= 1".into()));
        }
        if self.pipeline.concurrency == 0 {
            return Err(AdScreenError::Config("pipeline.concurrency must be >= 1".into()));
        }
        let t = self.pipeline.systemic_failure_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(AdScreenError::Config(format!(
                "pipeline.systemic_failure_threshold must be in (0, 1], got {t}"
            )));
        }
        Ok(())
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<FileConfig> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        Ok(FileConfig::default())
    }
}
