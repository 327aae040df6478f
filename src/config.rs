//! Run configuration.
//!
//! Loads from a TOML file with serde defaults for everything except the
//! source folder id.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::concurrency::{detect_workers, ConcurrencyStrategy, MemoryAwareStrategy, MAX_WORKERS};
use crate::utils::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Id of the source folder to mirror (required).
    pub source_folder_id: String,

    /// Parent of the mirror root at the destination.
    #[serde(default = "default_dest_parent")]
    pub dest_parent_id: String,

    /// Suffix appended to the source folder name to form the mirror root name.
    #[serde(default = "default_folder_suffix")]
    pub folder_suffix: String,

    /// Worker pool size. Absent means auto-computed from host resources.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Location of the persisted backup log.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Directory for per-transfer spool files. Absent means the system temp dir.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,

    /// Base delay for exponential backoff between transient attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_dest_parent() -> String {
    "root".to_string()
}

fn default_folder_suffix() -> String {
    "_BACKUP".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("backup_log.json")
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RunConfig {
    /// Configuration with defaults for everything but the source folder.
    pub fn new(source_folder_id: impl Into<String>) -> Self {
        Self {
            source_folder_id: source_folder_id.into(),
            dest_parent_id: default_dest_parent(),
            folder_suffix: default_folder_suffix(),
            workers: None,
            ledger_path: default_ledger_path(),
            spool_dir: None,
            retry_backoff_ms: default_retry_backoff_ms(),
            log: LogConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source_folder_id.trim().is_empty() {
            return Err(EngineError::Config("source_folder_id is required".into()));
        }
        if let Some(workers) = self.workers {
            if workers == 0 || workers > MAX_WORKERS {
                return Err(EngineError::Config(format!(
                    "workers must be between 1 and {}, got {}",
                    MAX_WORKERS, workers
                )));
            }
        }
        Ok(())
    }

    /// The worker count to run with: explicit value, or the host-derived default.
    pub fn resolved_workers(&self) -> usize {
        match self.workers {
            Some(workers) => workers,
            None => detect_workers(&MemoryAwareStrategy),
        }
    }

    /// Same as [`resolved_workers`](Self::resolved_workers) with a caller-supplied strategy.
    pub fn resolved_workers_with(&self, strategy: &dyn ConcurrencyStrategy) -> usize {
        match self.workers {
            Some(workers) => workers,
            None => detect_workers(strategy),
        }
    }
}
