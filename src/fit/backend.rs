//! Inference backend seam.
//!
//! The sampler is a black box: it gets a log-likelihood, a prior transform, a
//! parameter count, a working directory and an iteration budget, and returns
//! posterior samples plus the log-evidence. `summarise` turns that raw output
//! into the `PosteriorSummary` the rest of the pipeline consumes.

use std::path::Path;

use crate::domain::PosteriorSummary;
use crate::math::{quantile, stdev};

/// Lower/upper credible bounds: the ±1σ quantiles of a normal distribution.
pub const CREDIBLE_LOW: f64 = 0.158_655_253_931_457_05;
pub const CREDIBLE_HIGH: f64 = 0.841_344_746_068_542_9;

/// What a backend is asked to sample.
pub struct InferenceProblem<'a> {
    pub param_names: &'a [String],
    /// Log-likelihood over a physical parameter vector.
    pub log_likelihood: &'a (dyn Fn(&[f64]) -> f64 + Sync),
    /// Unit cube → physical parameter vector.
    pub prior_transform: &'a (dyn Fn(&[f64]) -> Vec<f64> + Sync),
}

impl InferenceProblem<'_> {
    pub fn n_params(&self) -> usize {
        self.param_names.len()
    }
}

/// Raw sampler output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    /// Equally weighted posterior samples, each of length `n_params`.
    pub samples: Vec<Vec<f64>>,
    pub logz: f64,
    pub paramnames: Vec<String>,
}

/// An external Bayesian sampler.
///
/// Implementations may be slow and stochastic; errors are returned (not
/// swallowed) so the caller can isolate the failing cell.
pub trait InferenceBackend: Send + Sync {
    fn run(
        &self,
        problem: &InferenceProblem<'_>,
        working_dir: &Path,
        max_iters: usize,
    ) -> Result<RawResult, String>;
}

/// Derive the posterior summary from raw samples.
///
/// The point estimate is the median; `errlo`/`errup` are the absolute
/// distances to the 15.87% / 84.13% quantiles, so they are non-negative even
/// if a bound lands on the "wrong" side of the point. The maximum-likelihood
/// point is the sample with the highest log-likelihood.
pub fn summarise(
    raw: &RawResult,
    log_likelihood: &(dyn Fn(&[f64]) -> f64 + Sync),
) -> Result<PosteriorSummary, String> {
    let n = raw.paramnames.len();
    if raw.samples.is_empty() {
        return Err("backend returned no posterior samples".into());
    }
    if let Some(bad) = raw.samples.iter().find(|s| s.len() != n) {
        return Err(format!("sample of length {} for {n} parameters", bad.len()));
    }

    let mut median = Vec::with_capacity(n);
    let mut sd = Vec::with_capacity(n);
    let mut errlo = Vec::with_capacity(n);
    let mut errup = Vec::with_capacity(n);
    for i in 0..n {
        let column: Vec<f64> = raw.samples.iter().map(|s| s[i]).collect();
        let mid = quantile(&column, 0.5);
        median.push(mid);
        sd.push(stdev(&column));
        errlo.push((mid - quantile(&column, CREDIBLE_LOW)).abs());
        errup.push((quantile(&column, CREDIBLE_HIGH) - mid).abs());
    }

    let mut best = (f64::NEG_INFINITY, &raw.samples[0]);
    for s in &raw.samples {
        let ll = log_likelihood(s);
        if ll > best.0 {
            best = (ll, s);
        }
    }

    Ok(PosteriorSummary {
        param_names: raw.paramnames.clone(),
        max_likelihood_point: best.1.clone(),
        median,
        stdev: sd,
        errlo,
        errup,
        logz: raw.logz,
    })
}
