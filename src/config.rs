//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (TETRADB_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [storage]
//! data_dir = "/var/lib/tetradb/data"
//!
//! [planner]
//! decorrelate_subqueries = true
//! subquery_workers = 4
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TETRADB_STORAGE__DATA_DIR=/custom/path
//! TETRADB_PLANNER__SUBQUERY_WORKERS=8
//! ```

use crate::plan::PlannerOptions;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for the key-value engine's files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: default_data_dir(),
        }
    }
}

/// Planner configuration; maps onto [`PlannerOptions`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_true")]
    pub decorrelate_subqueries: bool,

    #[serde(default = "default_true")]
    pub parallel_decorrelation: bool,

    /// Worker count for parallel decorrelation; 0 = use available parallelism
    #[serde(default)]
    pub subquery_workers: usize,

    /// Maximum patterns per phase; 0 = unlimited
    #[serde(default)]
    pub max_phase_patterns: usize,

    /// Aggregation inputs at or above this size use the streaming path
    #[serde(default = "default_streaming_threshold")]
    pub streaming_aggregation_threshold: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            decorrelate_subqueries: true,
            parallel_decorrelation: true,
            subquery_workers: 0,
            max_phase_patterns: 0,
            streaming_aggregation_threshold: default_streaming_threshold(),
        }
    }
}

impl From<PlannerConfig> for PlannerOptions {
    fn from(config: PlannerConfig) -> PlannerOptions {
        PlannerOptions {
            decorrelate_subqueries: config.decorrelate_subqueries,
            parallel_decorrelation: config.parallel_decorrelation,
            subquery_workers: config.subquery_workers,
            max_phase_patterns: config.max_phase_patterns,
            streaming_aggregation_threshold: config.streaming_aggregation_threshold,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_true() -> bool {
    true
}
fn default_streaming_threshold() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (TETRADB_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("TETRADB_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TETRADB_").split("__"))
            .extract()
    }

    /// Install a `tracing` subscriber honoring the configured level.
    /// `RUST_LOG` takes precedence when set.
    pub fn init_logging(&self) {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.logging.level.clone()));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}
