//! Pipeline configuration.
//!
//! Loaded from a TOML file, then overridden by environment variables (a `.env`
//! file is honoured):
//!
//! - `SEDFIT_CACHE_DIR`: root of the fit cache
//! - `SEDFIT_FLUX_DIR`: directory of per-epoch flux tables
//! - `SEDFIT_WORKERS`: cap on concurrent fit jobs
//!
//! Per-target data-quality exceptions (excluded epochs, fewer expected epochs)
//! live in `[[targets]]` records rather than in code.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Epoch;
use crate::error::FitError;

const DEFAULT_MAX_ITERS: usize = 50_000;
const DEFAULT_CLAIM_TIMEOUT_SECS: u64 = 6 * 3600;

/// Settings of the built-in nested sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of live points.
    pub n_live: usize,
    /// Random-walk steps per replacement draw.
    pub walk_steps: usize,
    /// Stop once the live points can add less than this to `logZ`.
    pub dlogz: f64,
    pub seed: u64,
    /// Threads a single inference run uses internally (for pool sizing).
    pub threads_per_job: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            n_live: 400,
            walk_steps: 25,
            dlogz: 0.5,
            seed: 42,
            threads_per_job: 1,
        }
    }
}

/// Per-target settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Denominator of the evidence average. Defaults to the number of
    /// non-excluded epochs.
    #[serde(default)]
    pub expected_epoch_count: Option<usize>,
    /// Epoch labels never fitted for this target.
    #[serde(default)]
    pub excluded_epochs: Vec<String>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected_epoch_count: None,
            excluded_epochs: Vec::new(),
        }
    }

    pub fn is_excluded(&self, epoch: &Epoch) -> bool {
        self.excluded_epochs.iter().any(|e| e == &epoch.label)
    }

    /// Epochs of `all` that this target is fitted on.
    pub fn active_epochs(&self, all: &[Epoch]) -> Vec<Epoch> {
        all.iter().filter(|e| !self.is_excluded(e)).cloned().collect()
    }

    pub fn expected_epoch_count(&self, all: &[Epoch]) -> usize {
        self.expected_epoch_count
            .unwrap_or_else(|| self.active_epochs(all).len())
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    pub flux_dir: PathBuf,
    #[serde(default = "default_run_id")]
    pub run_id: u32,
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,
    /// Candidate models in priority order; empty means the whole catalog.
    #[serde(default)]
    pub models: Vec<String>,
    /// Epoch labels in time order.
    pub epochs: Vec<String>,
    /// Canonical parameter names extracted for the chosen model.
    #[serde(default = "default_series_params")]
    pub series_params: Vec<String>,
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// Upper bound on concurrent fit jobs.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_secs: u64,
    pub targets: Vec<TargetConfig>,
}

fn default_run_id() -> u32 {
    1
}

fn default_max_iters() -> usize {
    DEFAULT_MAX_ITERS
}

fn default_claim_timeout() -> u64 {
    DEFAULT_CLAIM_TIMEOUT_SECS
}

fn default_series_params() -> Vec<String> {
    vec!["peak frequency".to_string(), "spectral index".to_string()]
}

impl PipelineConfig {
    /// Read a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let text = std::fs::read_to_string(path).map_err(|e| FitError::io(path, e))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, FitError> {
        toml::from_str(text).map_err(|e| FitError::Config(format!("Invalid config TOML: {e}")))
    }

    fn apply_env(&mut self) {
        dotenvy::dotenv().ok();
        if let Ok(dir) = std::env::var("SEDFIT_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("SEDFIT_FLUX_DIR") {
            self.flux_dir = PathBuf::from(dir);
        }
        if let Some(n) = std::env::var("SEDFIT_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.workers = Some(n);
        }
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.epochs.is_empty() {
            return Err(FitError::Config("At least one epoch is required.".into()));
        }
        if self.targets.is_empty() {
            return Err(FitError::Config("At least one target is required.".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.epochs.iter().find(|e| !seen.insert(e.as_str())) {
            return Err(FitError::Config(format!("Duplicate epoch label '{dup}'.")));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.targets.iter().find(|t| !seen.insert(t.name.as_str())) {
            return Err(FitError::Config(format!("Duplicate target '{}'.", dup.name)));
        }
        for target in &self.targets {
            if let Some(bad) = target
                .excluded_epochs
                .iter()
                .find(|e| !self.epochs.contains(e))
            {
                return Err(FitError::Config(format!(
                    "Target '{}' excludes unknown epoch '{bad}'.",
                    target.name
                )));
            }
            if target.expected_epoch_count == Some(0) {
                return Err(FitError::Config(format!(
                    "Target '{}' has expected_epoch_count = 0.",
                    target.name
                )));
            }
        }
        if self.max_iters == 0 {
            return Err(FitError::Config("max_iters must be >= 1.".into()));
        }
        if self.sampler.n_live < 2 {
            return Err(FitError::Config("sampler.n_live must be >= 2.".into()));
        }
        if !(self.sampler.dlogz.is_finite() && self.sampler.dlogz > 0.0) {
            return Err(FitError::Config("sampler.dlogz must be finite and > 0.".into()));
        }
        if self.workers == Some(0) {
            return Err(FitError::Config("workers must be >= 1.".into()));
        }
        Ok(())
    }

    pub fn epoch_sequence(&self) -> Vec<Epoch> {
        Epoch::sequence(&self.epochs)
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Pool size: explicit cap, else cores divided by the backend's own threads.
    pub fn worker_count(&self) -> usize {
        let per_job = self.sampler.threads_per_job.max(1);
        let by_cores = (num_cpus::get() / per_job).max(1);
        match self.workers {
            Some(cap) => cap.min(by_cores).max(1),
            None => by_cores,
        }
    }
}
