//! Evidence aggregation across epochs.
//!
//! The aggregate of a model is the NaN-aware sum of its per-epoch `logZ`
//! divided by the target's expected epoch count. A model without a single
//! finite epoch aggregates to NaN so that it cannot win selection.

use log::debug;

use crate::domain::{AggregateEvidence, Epoch, EvidenceMatrix, EvidenceRow, FitKey, ModelEvidence};
use crate::error::FitError;
use crate::fit::cache::FitCache;
use crate::math::nan_sum;

/// Builds evidence matrices from the fit cache and aggregates them.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceAggregator<'a> {
    cache: &'a FitCache,
    run_id: u32,
}

impl<'a> EvidenceAggregator<'a> {
    pub fn new(cache: &'a FitCache, run_id: u32) -> Self {
        Self { cache, run_id }
    }

    /// `model → epoch → logZ`; cells without a usable cached summary are NaN.
    pub fn matrix(&self, target: &str, models: &[String], epochs: &[Epoch]) -> EvidenceMatrix {
        self.matrix_skipping(target, models, epochs, |_| false)
    }

    /// As [`matrix`](Self::matrix), but epochs matching `skip` are NaN
    /// without consulting the cache (stale fits of excluded epochs stay out).
    pub fn matrix_skipping(
        &self,
        target: &str,
        models: &[String],
        epochs: &[Epoch],
        skip: impl Fn(&Epoch) -> bool,
    ) -> EvidenceMatrix {
        let rows = models
            .iter()
            .map(|model_id| EvidenceRow {
                model_id: model_id.clone(),
                logz: epochs
                    .iter()
                    .map(|epoch| {
                        if skip(epoch) {
                            return f64::NAN;
                        }
                        let key = FitKey::new(target, epoch.label.as_str(), model_id.as_str(), self.run_id);
                        match self.cache.load(&key) {
                            Ok(summary) => summary.logz,
                            Err(e) => {
                                debug!("{key}: no evidence ({e})");
                                f64::NAN
                            }
                        }
                    })
                    .collect(),
            })
            .collect();
        EvidenceMatrix {
            target: target.to_string(),
            epochs: epochs.to_vec(),
            rows,
        }
    }

    /// Matrix + aggregation in one step.
    pub fn aggregate(
        &self,
        target: &str,
        models: &[String],
        epochs: &[Epoch],
        expected_epoch_count: usize,
    ) -> Result<AggregateEvidence, FitError> {
        aggregate_matrix(&self.matrix(target, models, epochs), expected_epoch_count)
    }
}

/// Aggregate an already-built matrix.
///
/// Only NaN cells are skipped; a `-inf` logZ is a (very poor) measurement and
/// takes part in the sum.
pub fn aggregate_matrix(
    matrix: &EvidenceMatrix,
    expected_epoch_count: usize,
) -> Result<AggregateEvidence, FitError> {
    if expected_epoch_count == 0 {
        return Err(FitError::Config(format!(
            "Target '{}' expects zero epochs; evidence cannot be averaged.",
            matrix.target
        )));
    }
    let models = matrix
        .rows
        .iter()
        .map(|row| {
            let (sum, count) = nan_sum(&row.logz);
            let aggregate_logz = if count == 0 {
                f64::NAN
            } else {
                sum / expected_epoch_count as f64
            };
            ModelEvidence {
                model_id: row.model_id.clone(),
                aggregate_logz,
                epochs_with_data: count,
            }
        })
        .collect();
    Ok(AggregateEvidence {
        target: matrix.target.clone(),
        expected_epoch_count,
        models,
    })
}
