//! Per-epoch parameter trajectories of a chosen model.

use crate::domain::{Epoch, FitKey, ParamEstimate, ParameterSeries, SeriesPoint, TargetConfig};
use crate::error::FitError;
use crate::fit::FitCache;
use crate::models::{CanonicalParam, ModelCatalog};

/// Reads trajectories out of the fit cache. Never triggers a fit.
#[derive(Debug, Clone, Copy)]
pub struct ParameterTimeSeries<'a> {
    cache: &'a FitCache,
    catalog: &'a ModelCatalog,
    run_id: u32,
}

impl<'a> ParameterTimeSeries<'a> {
    pub fn new(cache: &'a FitCache, catalog: &'a ModelCatalog, run_id: u32) -> Self {
        Self {
            cache,
            catalog,
            run_id,
        }
    }

    /// `(value, errlo, errup)` of `param` for every epoch.
    ///
    /// Every epoch must have a cached summary; a no-data sentinel gives a
    /// NaN point.
    pub fn extract(
        &self,
        target: &str,
        model_id: &str,
        param: CanonicalParam,
        epochs: &[Epoch],
    ) -> Result<ParameterSeries, FitError> {
        self.extract_skipping(target, model_id, param, epochs, |_| false)
    }

    /// Like `extract`, but the target's excluded epochs are NaN points
    /// without a cache lookup (they were never fitted).
    pub fn extract_for(
        &self,
        target: &TargetConfig,
        model_id: &str,
        param: CanonicalParam,
        epochs: &[Epoch],
    ) -> Result<ParameterSeries, FitError> {
        self.extract_skipping(&target.name, model_id, param, epochs, |e| target.is_excluded(e))
    }

    /// Extraction where `skip(epoch)` epochs become NaN points without a cache lookup.
    pub fn extract_skipping(
        &self,
        target: &str,
        model_id: &str,
        param: CanonicalParam,
        epochs: &[Epoch],
        skip: impl Fn(&Epoch) -> bool,
    ) -> Result<ParameterSeries, FitError> {
        let model = self.catalog.get(model_id)?;
        let param_name = model
            .resolve(param)
            .ok_or_else(|| FitError::ParameterNotApplicable {
                model: model_id.to_string(),
                param: param.to_string(),
            })?;

        let mut points = Vec::with_capacity(epochs.len());
        for epoch in epochs {
            let estimate = if skip(epoch) {
                ParamEstimate::MISSING
            } else {
                let key = FitKey::new(target, epoch.label.as_str(), model_id, self.run_id);
                let summary = self.cache.load(&key)?;
                summary.estimate(param_name).unwrap_or(ParamEstimate::MISSING)
            };
            points.push(SeriesPoint {
                epoch: epoch.clone(),
                estimate,
            });
        }

        Ok(ParameterSeries {
            target: target.to_string(),
            model_id: model_id.to_string(),
            canonical_name: param.to_string(),
            param_name: param_name.to_string(),
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PosteriorSummary;

    fn fitted(names: &[&str], median: &[f64]) -> PosteriorSummary {
        let n = names.len();
        PosteriorSummary {
            param_names: names.iter().map(|s| s.to_string()).collect(),
            max_likelihood_point: median.to_vec(),
            median: median.to_vec(),
            stdev: vec![0.1; n],
            errlo: vec![0.05; n],
            errup: vec![0.2; n],
            logz: -10.0,
        }
    }

    fn setup() -> (tempfile::TempDir, FitCache, ModelCatalog, Vec<Epoch>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FitCache::new(dir.path());
        let names = ["Snorm", "beta", "peakfreq"];
        cache
            .store(&FitKey::new("X", "e1", "singSSA", 1), &fitted(&names, &[1.0, 2.5, 0.3]))
            .unwrap();
        let sentinel = PosteriorSummary::no_data(&names.map(String::from));
        cache.store(&FitKey::new("X", "e2", "singSSA", 1), &sentinel).unwrap();
        (dir, cache, ModelCatalog::standard(), Epoch::sequence(&["e1", "e2"]))
    }

    #[test]
    fn resolves_alias_and_marks_no_data_epochs() {
        let (_dir, cache, catalog, epochs) = setup();
        let ts = ParameterTimeSeries::new(&cache, &catalog, 1);
        let series = ts
            .extract("X", "singSSA", CanonicalParam::SpectralIndex, &epochs)
            .unwrap();
        assert_eq!(series.param_name, "beta");
        assert_eq!(series.canonical_name, "spectral index");
        let first = series.at(&epochs[0]).unwrap();
        assert_eq!((first.value, first.errlo, first.errup), (2.5, 0.05, 0.2));
        let second = series.at(&epochs[1]).unwrap();
        assert!(second.value.is_nan() && second.errlo.is_nan() && second.errup.is_nan());
    }

    #[test]
    fn inapplicable_parameter_is_an_error() {
        let (_dir, cache, catalog, epochs) = setup();
        let ts = ParameterTimeSeries::new(&cache, &catalog, 1);
        let err = ts
            .extract("X", "singSSA", CanonicalParam::BreakFrequency, &epochs)
            .unwrap_err();
        assert!(matches!(err, FitError::ParameterNotApplicable { ref model, .. } if model == "singSSA"));
    }

    #[test]
    fn cache_miss_is_an_error_not_a_refit() {
        let (_dir, cache, catalog, _) = setup();
        let ts = ParameterTimeSeries::new(&cache, &catalog, 1);
        let epochs = Epoch::sequence(&["e1", "e2", "e3"]);
        let err = ts
            .extract("X", "singSSA", CanonicalParam::PeakFrequency, &epochs)
            .unwrap_err();
        assert!(matches!(err, FitError::CacheMiss(_)));
    }

    #[test]
    fn excluded_epochs_are_missing_without_lookup() {
        let (_dir, cache, catalog, _) = setup();
        let ts = ParameterTimeSeries::new(&cache, &catalog, 1);
        let epochs = Epoch::sequence(&["e1", "e2", "e3"]);
        let mut target = TargetConfig::new("X");
        target.excluded_epochs = vec!["e3".into()];
        let series = ts
            .extract_for(&target, "singSSA", CanonicalParam::PeakFrequency, &epochs)
            .unwrap();
        assert_eq!(series.points.len(), 3);
        assert!(series.points[2].estimate.is_missing());
        assert_eq!(series.points[0].estimate.value, 0.3);
    }
}
