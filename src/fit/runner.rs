//! One `(target, epoch, model, run_id)` unit of work.
//!
//! Order of operations:
//!
//! 1. a complete cached summary wins; no inference
//! 2. no usable data after masking → persisted NaN sentinel; no inference
//! 3. otherwise claim the run directory, sample, summarise, store
//!
//! Backend failures are returned to the caller; the scheduler isolates them.

use std::time::Duration;

use log::{debug, warn};

use crate::domain::{Epoch, FitKey, FluxObservation, FluxSet, PosteriorSummary};
use crate::error::FitError;
use crate::fit::backend::{InferenceBackend, InferenceProblem, summarise};
use crate::fit::cache::FitCache;
use crate::io::FluxProvider;
use crate::models::{ModelCatalog, ParamVector};

const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

/// Runs (or reuses) a single fit.
pub struct FitRunner<'a> {
    catalog: &'a ModelCatalog,
    cache: &'a FitCache,
    backend: &'a dyn InferenceBackend,
    max_iters: usize,
    claim_timeout: Duration,
}

impl<'a> FitRunner<'a> {
    pub fn new(
        catalog: &'a ModelCatalog,
        cache: &'a FitCache,
        backend: &'a dyn InferenceBackend,
        max_iters: usize,
    ) -> Self {
        Self {
            catalog,
            cache,
            backend,
            max_iters,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    /// Fetch the epoch's observations from `provider` (only on a cache miss) and run.
    ///
    /// `DataUnavailable` from the provider is treated as an empty table.
    pub fn run_from(
        &self,
        key: &FitKey,
        epoch: &Epoch,
        provider: &dyn FluxProvider,
    ) -> Result<PosteriorSummary, FitError> {
        if let Some(summary) = self.cached(key)? {
            return Ok(summary);
        }
        let observations = match provider.get(&key.target, epoch) {
            Ok(obs) => obs,
            Err(FitError::DataUnavailable { reason, .. }) => {
                debug!("{key}: {reason}");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        self.run(key, &observations)
    }

    /// Return the summary for `key`, fitting `observations` if it is not cached.
    pub fn run(&self, key: &FitKey, observations: &[FluxObservation]) -> Result<PosteriorSummary, FitError> {
        let model = self.catalog.get(&key.model_id)?;
        if let Some(summary) = self.cached(key)? {
            return Ok(summary);
        }

        let data = FluxSet::masked(observations);
        if data.is_empty() {
            debug!("{key}: no usable flux densities, storing sentinel");
            let sentinel = PosteriorSummary::no_data(model.param_names());
            self.cache.store(key, &sentinel)?;
            return Ok(sentinel);
        }

        let _claim = self.cache.claim(key, self.claim_timeout)?;
        // Another process may have finished between our check and the claim.
        if let Some(summary) = self.cached(key)? {
            return Ok(summary);
        }

        let n_params = model.n_params();
        let log_likelihood = |p: &[f64]| match model.params(p.to_vec()) {
            Ok(params) => model.log_likelihood(&data, &params),
            Err(_) => f64::NEG_INFINITY,
        };
        let prior_transform = |cube: &[f64]| {
            model
                .transform_prior(cube)
                .map(ParamVector::into_values)
                .unwrap_or_else(|_| vec![f64::NAN; n_params])
        };
        let problem = InferenceProblem {
            param_names: model.param_names(),
            log_likelihood: &log_likelihood,
            prior_transform: &prior_transform,
        };

        debug!("{key}: sampling {} points", data.len());
        let work_dir = self.cache.run_dir(key);
        let raw = self
            .backend
            .run(&problem, &work_dir, self.max_iters)
            .map_err(|reason| inference_error(key, reason))?;
        if raw.paramnames != model.param_names() {
            return Err(inference_error(
                key,
                format!("backend returned parameters {:?}", raw.paramnames),
            ));
        }
        let summary = summarise(&raw, &log_likelihood).map_err(|reason| inference_error(key, reason))?;

        self.cache.store(key, &summary)?;
        Ok(summary)
    }

    /// Cached summary, if a usable one exists. Malformed files count as misses.
    fn cached(&self, key: &FitKey) -> Result<Option<PosteriorSummary>, FitError> {
        match self.cache.load(key) {
            Ok(summary) => {
                debug!("{key}: cache hit");
                Ok(Some(summary))
            }
            Err(FitError::CacheMiss(_)) => Ok(None),
            Err(FitError::MalformedCache { path, reason }) => {
                warn!("{key}: ignoring malformed cache '{}': {reason}", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn inference_error(key: &FitKey, reason: String) -> FitError {
    FitError::Inference {
        target: key.target.clone(),
        epoch: key.epoch.clone(),
        model: key.model_id.clone(),
        reason,
    }
}
