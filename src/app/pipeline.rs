//! Per-target pipeline shared by the `run` and `evidence` commands.
//!
//! run:      fit grid (worker pool) -> join -> evidence -> selection -> series + variability
//! evidence: evidence -> selection -> series + variability, from the cache only
//!
//! A target-level error (no viable model, bad config) is logged and the batch
//! moves on to the next target.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::app::scheduler::{WorkerPool, grid_jobs};
use crate::domain::{
    CellFailure, Epoch, EvidenceMatrix, FitKey, ModelSelection, ParameterSeries, PipelineConfig, TargetConfig,
};
use crate::error::FitError;
use crate::fit::{EvidenceAggregator, FitCache, FitRunner, InferenceBackend, ModelSelector, aggregate_matrix};
use crate::io::FluxProvider;
use crate::models::{CanonicalParam, ModelCatalog};
use crate::report::{FluxVariability, ParameterTimeSeries, flux_variability};

/// Everything computed for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub matrix: EvidenceMatrix,
    pub selection: ModelSelection,
    pub series: Vec<ParameterSeries>,
    pub variability: FluxVariability,
    /// Grid cells that failed in this invocation (recorded as NaN evidence).
    pub failures: Vec<CellFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetError {
    pub target: String,
    pub message: String,
}

/// Outcome of a batch over several targets.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub run_id: u32,
    pub reports: Vec<TargetReport>,
    pub errors: Vec<TargetError>,
}

impl BatchReport {
    pub fn all_failed(&self) -> bool {
        self.reports.is_empty() && !self.errors.is_empty()
    }

    /// `Err` when no target produced a report.
    pub fn status(&self) -> Result<(), FitError> {
        if self.all_failed() {
            return Err(FitError::AllTargetsFailed {
                failed: self.errors.len(),
            });
        }
        Ok(())
    }
}

/// Shared context for processing targets.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    catalog: &'a ModelCatalog,
    backend: &'a dyn InferenceBackend,
    provider: &'a dyn FluxProvider,
    cache: FitCache,
    models: Vec<String>,
    epochs: Vec<Epoch>,
    series_params: Vec<CanonicalParam>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        catalog: &'a ModelCatalog,
        backend: &'a dyn InferenceBackend,
        provider: &'a dyn FluxProvider,
    ) -> Result<Self, FitError> {
        let models = catalog.select(&config.models)?;
        let series_params = config
            .series_params
            .iter()
            .map(|p| p.parse())
            .collect::<Result<Vec<CanonicalParam>, _>>()?;
        Ok(Self {
            config,
            catalog,
            backend,
            provider,
            cache: FitCache::new(&config.cache_dir),
            models,
            epochs: config.epoch_sequence(),
            series_params,
        })
    }

    pub fn cache(&self) -> &FitCache {
        &self.cache
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Fit the whole grid of a target, then assess it.
    pub fn run_target(&self, target: &TargetConfig, pool: &WorkerPool) -> Result<TargetReport, FitError> {
        let active = target.active_epochs(&self.epochs);
        let jobs = grid_jobs(&target.name, &active, &self.models, self.config.run_id);
        info!(
            "{}: {} epochs x {} models on {} workers",
            target.name,
            active.len(),
            self.models.len(),
            pool.size()
        );

        let runner = FitRunner::new(self.catalog, &self.cache, self.backend, self.config.max_iters)
            .with_claim_timeout(Duration::from_secs(self.config.claim_timeout_secs));
        let outcomes = pool.run_grid(&runner, self.provider, &jobs);

        let mut failures = Vec::new();
        for outcome in outcomes {
            if let Err(e) = outcome.result {
                warn!("{}: {e}", outcome.key);
                failures.push(CellFailure {
                    epoch: outcome.key.epoch,
                    model_id: outcome.key.model_id,
                    message: e.to_string(),
                });
            }
        }
        info!(
            "{}: {} cells done, {} failed",
            target.name,
            jobs.len() - failures.len(),
            failures.len()
        );

        self.assess(target, failures)
    }

    /// Aggregate, select and extract from whatever is cached. Never fits.
    pub fn evaluate_target(&self, target: &TargetConfig) -> Result<TargetReport, FitError> {
        self.assess(target, Vec::new())
    }

    fn assess(&self, target: &TargetConfig, failures: Vec<CellFailure>) -> Result<TargetReport, FitError> {
        let aggregator = EvidenceAggregator::new(&self.cache, self.config.run_id);
        let matrix = aggregator.matrix_skipping(&target.name, &self.models, &self.epochs, |e| target.is_excluded(e));
        let aggregate = aggregate_matrix(&matrix, target.expected_epoch_count(&self.epochs))?;
        let selection = ModelSelector::select(&aggregate)?;
        info!(
            "{}: chose {} (Bayes factor {:.3} vs {})",
            target.name,
            selection.chosen_model,
            selection.bayes_factor,
            selection.runner_up.as_deref().unwrap_or("-")
        );

        let chosen = selection.chosen_model.as_str();
        // Cells without usable evidence (excluded, failed, sentinel or not yet
        // fitted) are NaN points; no cache lookup is attempted for them.
        let skip = |e: &Epoch| matrix.get(chosen, e).is_none_or(f64::is_nan);

        let extractor = ParameterTimeSeries::new(&self.cache, self.catalog, self.config.run_id);
        let mut series = Vec::new();
        for &param in &self.series_params {
            match extractor.extract_skipping(&target.name, chosen, param, &self.epochs, skip) {
                Ok(s) => series.push(s),
                Err(FitError::ParameterNotApplicable { model, param }) => {
                    info!("{}: {model} has no {param}; series skipped", target.name);
                }
                Err(e) => return Err(e),
            }
        }

        let summaries: Vec<_> = self
            .epochs
            .iter()
            .map(|e| {
                if skip(e) {
                    return None;
                }
                let key = FitKey::new(target.name.as_str(), e.label.as_str(), chosen, self.config.run_id);
                self.cache.load(&key).ok()
            })
            .collect();
        let variability = flux_variability(&target.name, self.catalog.get(chosen)?, &self.epochs, &summaries)?;

        Ok(TargetReport {
            target: target.name.clone(),
            matrix,
            selection,
            series,
            variability,
            failures,
        })
    }

    /// Process several targets; per-target errors are collected, not propagated.
    pub fn run_batch<F>(&self, targets: &[&TargetConfig], mut process: F) -> BatchReport
    where
        F: FnMut(&TargetConfig) -> Result<TargetReport, FitError>,
    {
        let mut reports = Vec::new();
        let mut errors = Vec::new();
        for target in targets {
            match process(target) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("{}: {e}", target.name);
                    errors.push(TargetError {
                        target: target.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        BatchReport {
            generated_at: Utc::now(),
            run_id: self.config.run_id,
            reports,
            errors,
        }
    }
}
