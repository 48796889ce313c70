//! Runtime configuration
//!
//! A JSON file supplies defaults for the binaries; command-line flags and
//! `VECCERT_*` environment variables override individual fields (see the
//! `issuer` and `verifier` binaries). Missing sections fall back to
//! [`Default`].
//!
//! ```json
//! {
//!   "srs": { "g1_path": "srs/g1.json", "g2_path": "srs/g2.json", "depth": 4096 },
//!   "scheduler": {
//!     "workers_per_core": 2,
//!     "chunk_deadline": { "secs": 600, "nanos": 0 }
//!   },
//!   "ledger_dir": "ledger"
//! }
//! ```

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;
use crate::srs::{Srs, SrsError, MAX_DEPTH};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// File is not valid config JSON.
    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range or a required value is missing.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Loading the configured SRS failed.
    #[error(transparent)]
    Srs(#[from] SrsError),
}

/// Where the ceremony files live and how much of them to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SrsConfig {
    /// G1 powers file.
    pub g1_path: Option<PathBuf>,
    /// G2 powers file.
    pub g2_path: Option<PathBuf>,
    /// G1 powers to load (maximum batch size).
    pub depth: usize,
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            g1_path: None,
            g2_path: None,
            depth: 1024,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trusted setup.
    pub srs: SrsConfig,
    /// Proof scheduler.
    pub scheduler: SchedulerConfig,
    /// Directory ledger root.
    pub ledger_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            srs: SrsConfig::default(),
            scheduler: SchedulerConfig::default(),
            ledger_dir: PathBuf::from("ledger"),
        }
    }
}

impl Config {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Config file when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    /// Range checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.srs.depth == 0 || self.srs.depth > MAX_DEPTH {
            return invalid(format!("srs.depth {} outside 1..={MAX_DEPTH}", self.srs.depth));
        }
        let sched = &self.scheduler;
        if sched.workers_per_core == 0 {
            return invalid("scheduler.workers_per_core must be non-zero".into());
        }
        if sched.max_workers == Some(0) {
            return invalid("scheduler.max_workers must be non-zero".into());
        }
        if sched.chunk_count == Some(0) {
            return invalid("scheduler.chunk_count must be non-zero".into());
        }
        if sched.chunk_deadline.is_some_and(|d| d.is_zero()) {
            return invalid("scheduler.chunk_deadline must be positive".into());
        }
        Ok(())
    }

    /// Load the ceremony files named in `srs`.
    pub fn load_srs(&self) -> Result<Srs, ConfigError> {
        let (Some(g1), Some(g2)) = (&self.srs.g1_path, &self.srs.g2_path) else {
            let msg = "srs.g1_path and srs.g2_path are required";
            return Err(ConfigError::Invalid(msg.into()));
        };
        Ok(Srs::from_paths(self.srs.depth, g1, g2)?)
    }
}
