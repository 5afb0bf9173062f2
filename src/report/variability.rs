//! Flux-density variability of the chosen model.
//!
//! For each epoch the model is evaluated at its maximum-likelihood point at a
//! few fixed reference frequencies and at its own peak frequency. The
//! variability span of a row is `max - min` over epochs with data.

use serde::Serialize;

use crate::domain::{Epoch, PosteriorSummary, nan_as_null};
use crate::error::FitError;
use crate::math::{nan_max, nan_min};
use crate::models::{CanonicalParam, SpectralModel};

/// Reference frequencies (GHz).
pub const REFERENCE_FREQUENCIES: [f64; 4] = [0.15, 2.1, 5.5, 9.5];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariabilityRow {
    /// `"0.15 GHz"`, ..., or `"peak"`.
    pub label: String,
    /// Fixed frequency; `None` for the per-epoch peak row.
    pub frequency: Option<f64>,
    /// Model flux density per epoch (NaN where the epoch has no fit).
    #[serde(with = "nan_as_null::vec")]
    pub flux: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluxVariability {
    pub target: String,
    pub model_id: String,
    pub epochs: Vec<Epoch>,
    pub rows: Vec<VariabilityRow>,
}

impl FluxVariability {
    pub fn row(&self, label: &str) -> Option<&VariabilityRow> {
        self.rows.iter().find(|r| r.label == label)
    }
}

/// Build the variability table from per-epoch summaries of one model.
///
/// `summaries[i]` belongs to `epochs[i]`; `None` and no-data sentinels give NaN.
pub fn flux_variability(
    target: &str,
    model: &SpectralModel,
    epochs: &[Epoch],
    summaries: &[Option<PosteriorSummary>],
) -> Result<FluxVariability, FitError> {
    let peak_param = model.resolve(CanonicalParam::PeakFrequency);

    let mut points = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let point = match summary {
            Some(s) if !s.is_no_data() => Some(model.params(s.max_likelihood_point.clone())?),
            _ => None,
        };
        points.push(point);
    }

    let mut rows: Vec<VariabilityRow> = REFERENCE_FREQUENCIES
        .iter()
        .map(|&nu| {
            let flux: Vec<f64> = points
                .iter()
                .map(|p| p.as_ref().map_or(f64::NAN, |p| model.evaluate_at(nu, p)))
                .collect();
            row(format!("{nu} GHz"), Some(nu), flux)
        })
        .collect();

    if let Some(name) = peak_param {
        let flux: Vec<f64> = points
            .iter()
            .map(|p| match p {
                Some(p) => p.get(name).map_or(f64::NAN, |nu| model.evaluate_at(nu, p)),
                None => f64::NAN,
            })
            .collect();
        rows.push(row("peak".to_string(), None, flux));
    }

    Ok(FluxVariability {
        target: target.to_string(),
        model_id: model.id().to_string(),
        epochs: epochs.to_vec(),
        rows,
    })
}

fn row(label: String, frequency: Option<f64>, flux: Vec<f64>) -> VariabilityRow {
    let delta = nan_max(&flux) - nan_min(&flux);
    VariabilityRow {
        label,
        frequency,
        flux,
        delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelCatalog;
    use approx::assert_relative_eq;

    fn at(point: &[f64]) -> PosteriorSummary {
        let n = point.len();
        PosteriorSummary {
            param_names: vec!["a".to_string(), "alpha".to_string()],
            max_likelihood_point: point.to_vec(),
            median: point.to_vec(),
            stdev: vec![0.0; n],
            errlo: vec![0.0; n],
            errup: vec![0.0; n],
            logz: -1.0,
        }
    }

    #[test]
    fn span_is_max_minus_min_over_epochs_with_data() {
        let catalog = ModelCatalog::standard();
        let model = catalog.get("powlaw").unwrap();
        let epochs = Epoch::sequence(&["e1", "e2", "e3"]);
        let summaries = vec![Some(at(&[1.0, 0.0])), None, Some(at(&[3.0, 0.0]))];

        let v = flux_variability("X", model, &epochs, &summaries).unwrap();
        assert_eq!(v.rows.len(), 4);
        let r = v.row("2.1 GHz").unwrap();
        assert!(r.flux[1].is_nan());
        assert_relative_eq!(r.delta, 2.0, epsilon = 1e-12);
        assert!(v.row("peak").is_none());
    }

    #[test]
    fn peaked_model_gets_peak_row() {
        let catalog = ModelCatalog::standard();
        let model = catalog.get("singSSA").unwrap();
        let names = vec!["Snorm".to_string(), "beta".to_string(), "peakfreq".to_string()];
        let mut s = PosteriorSummary::no_data(&names);
        s.max_likelihood_point = vec![1.0, 2.5, 0.3];
        s.median = vec![1.0, 2.5, 0.3];
        s.logz = -2.0;

        let epochs = Epoch::sequence(&["e1", "e2"]);
        let v = flux_variability("X", model, &epochs, &[Some(s), Some(PosteriorSummary::no_data(&names))]).unwrap();
        let peak = v.row("peak").unwrap();
        assert!(peak.flux[0].is_finite());
        assert!(peak.flux[1].is_nan());
        assert_eq!(peak.delta, 0.0);
    }

    #[test]
    fn all_missing_gives_nan_span() {
        let catalog = ModelCatalog::standard();
        let model = catalog.get("powlaw").unwrap();
        let v = flux_variability("X", model, &Epoch::sequence(&["e1"]), &[None]).unwrap();
        assert!(v.rows.iter().all(|r| r.delta.is_nan()));
    }
}
