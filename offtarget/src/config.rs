// src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OffTargetError, Result};
use crate::export::ExportOptions;
use crate::intervals::DEFAULT_PAIRWISE_LIMIT;
use crate::search::gggenome_integration::DEFAULT_GGGENOME_URL;
use crate::search::{RetryPolicy, DEFAULT_FULL_MISMATCHES, DEFAULT_SEED_MISMATCHES};
use crate::sequence_prep::{DEFAULT_PAM, DEFAULT_SEED_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchBackend {
    Gggenome { base_url: String, timeout_secs: u64 },
    LocalFasta { path: PathBuf },
}

impl Default for SearchBackend {
    fn default() -> Self {
        SearchBackend::Gggenome {
            base_url: DEFAULT_GGGENOME_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntersectionBackend {
    /// `executable` unset means `$OFFTARGET_BEDTOOLS` or `bedtools` on `PATH`.
    Bedtools { executable: Option<PathBuf> },
    Pairwise,
}

impl Default for IntersectionBackend {
    fn default() -> Self {
        IntersectionBackend::Bedtools { executable: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
            max_wait_secs: policy.max_wait.as_secs(),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: cfg.max_attempts,
            backoff: Duration::from_millis(cfg.backoff_ms),
            max_wait: Duration::from_secs(cfg.max_wait_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    pub exons: PathBuf,
    pub introns: PathBuf,
}

/// Everything a run needs besides the guide itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub assembly: String,
    pub pam: String,
    pub seed_length: usize,
    pub full_mismatches: u8,
    pub seed_mismatches: u8,
    pub search: SearchBackend,
    pub retry: RetryConfig,
    pub parallel_search: bool,
    pub intersection: IntersectionBackend,
    pub pairwise_limit: u64,
    pub annotation: Option<AnnotationConfig>,
    pub output: ExportOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            assembly: "hg38".to_string(),
            pam: DEFAULT_PAM.to_string(),
            seed_length: DEFAULT_SEED_LENGTH,
            full_mismatches: DEFAULT_FULL_MISMATCHES,
            seed_mismatches: DEFAULT_SEED_MISMATCHES,
            search: SearchBackend::default(),
            retry: RetryConfig::default(),
            parallel_search: true,
            intersection: IntersectionBackend::default(),
            pairwise_limit: DEFAULT_PAIRWISE_LIMIT,
            annotation: None,
            output: ExportOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| OffTargetError::Config {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| OffTargetError::Config {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
    }

    /// Dumps the effective configuration as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| OffTargetError::Config {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        fs::write(path, json)?;
        Ok(())
    }
}
