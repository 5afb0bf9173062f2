//! Model registry.
//!
//! A `ModelCatalog` is built once at start-up and then shared read-only (by
//! reference or `Arc`) with every fit job. Registration order is the canonical
//! model priority: simpler families first. Selection ties resolve to the
//! earlier model.

use std::str::FromStr;

use serde::Serialize;

use crate::domain::FluxSet;
use crate::error::FitError;
use crate::models::{priors, spectra};

/// `S(ν)` for one frequency and an ordered parameter slice.
pub type SpectrumFn = fn(f64, &[f64]) -> f64;

/// Maps a unit-cube sample to a parameter vector.
pub type PriorTransformFn = fn(&[f64]) -> Vec<f64>;

/// Physical family a model belongs to; drives the parameter alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    PowerLaw,
    /// Synchrotron self-absorption.
    Ssa,
    /// Free-free absorption.
    Ffa,
}

/// Family-independent parameter names used by downstream analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CanonicalParam {
    Normalisation,
    SpectralIndex,
    PeakFrequency,
    BreakFrequency,
    Curvature,
    Inhomogeneity,
}

impl CanonicalParam {
    pub const ALL: [CanonicalParam; 6] = [
        CanonicalParam::Normalisation,
        CanonicalParam::SpectralIndex,
        CanonicalParam::PeakFrequency,
        CanonicalParam::BreakFrequency,
        CanonicalParam::Curvature,
        CanonicalParam::Inhomogeneity,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            CanonicalParam::Normalisation => "normalisation",
            CanonicalParam::SpectralIndex => "spectral index",
            CanonicalParam::PeakFrequency => "peak frequency",
            CanonicalParam::BreakFrequency => "break frequency",
            CanonicalParam::Curvature => "curvature",
            CanonicalParam::Inhomogeneity => "inhomogeneity",
        }
    }
}

impl std::fmt::Display for CanonicalParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for CanonicalParam {
    type Err = FitError;

    /// Accepts "spectral index", "spectral-index", "spectral_index" (any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        CanonicalParam::ALL
            .into_iter()
            .find(|p| p.display_name() == norm)
            .ok_or_else(|| FitError::Config(format!("Unknown canonical parameter '{s}'.")))
    }
}

impl ModelFamily {
    /// Alias table: the parameter name this family uses for a canonical quantity.
    ///
    /// Whether a particular model actually carries it is checked against its
    /// parameter list (e.g. only `*break*` models have a break frequency).
    pub fn alias(self, param: CanonicalParam) -> Option<&'static str> {
        use CanonicalParam::*;
        match (self, param) {
            (ModelFamily::PowerLaw, Normalisation) => Some("a"),
            (_, Normalisation) => Some("Snorm"),
            (ModelFamily::Ssa, SpectralIndex) => Some("beta"),
            (_, SpectralIndex) => Some("alpha"),
            (ModelFamily::Ssa, PeakFrequency) => Some("peakfreq"),
            (ModelFamily::Ffa, PeakFrequency) => Some("freqpeak"),
            (ModelFamily::PowerLaw, PeakFrequency) => None,
            (_, BreakFrequency) => Some("breakfreq"),
            (_, Curvature) => Some("q"),
            (ModelFamily::Ffa, Inhomogeneity) => Some("p"),
            (_, Inhomogeneity) => None,
        }
    }
}

/// An immutable spectral model definition.
#[derive(Debug, Clone)]
pub struct SpectralModel {
    id: String,
    family: ModelFamily,
    param_names: Vec<String>,
    spectrum: SpectrumFn,
    prior_transform: PriorTransformFn,
}

impl SpectralModel {
    pub fn new(
        id: impl Into<String>,
        family: ModelFamily,
        param_names: &[&str],
        spectrum: SpectrumFn,
        prior_transform: PriorTransformFn,
    ) -> Self {
        Self {
            id: id.into(),
            family,
            param_names: param_names.iter().map(|s| s.to_string()).collect(),
            spectrum,
            prior_transform,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn n_params(&self) -> usize {
        self.param_names.len()
    }

    /// Validate raw values against this model's parameter list.
    pub fn params(&self, values: Vec<f64>) -> Result<ParamVector<'_>, FitError> {
        if values.len() != self.param_names.len() {
            return Err(FitError::InvalidParameters {
                model: self.id.clone(),
                expected: self.param_names.len(),
                got: values.len(),
            });
        }
        Ok(ParamVector {
            names: &self.param_names,
            values,
        })
    }

    /// Unit cube → validated parameter vector.
    pub fn transform_prior(&self, cube: &[f64]) -> Result<ParamVector<'_>, FitError> {
        self.params((self.prior_transform)(cube))
    }

    /// Model flux densities at each frequency.
    pub fn evaluate(&self, frequency: &[f64], params: &ParamVector<'_>) -> Vec<f64> {
        frequency
            .iter()
            .map(|&nu| (self.spectrum)(nu, &params.values))
            .collect()
    }

    pub fn evaluate_at(&self, nu: f64, params: &ParamVector<'_>) -> f64 {
        (self.spectrum)(nu, &params.values)
    }

    /// Gaussian log-likelihood `-½ Σ[(S-m)²/σ² + ln σ²]`; non-finite → `-inf`.
    pub fn log_likelihood(&self, data: &FluxSet, params: &ParamVector<'_>) -> f64 {
        let mut acc = 0.0;
        for ((&nu, &s), &sigma) in data.frequency().iter().zip(data.flux()).zip(data.sigma()) {
            let m = (self.spectrum)(nu, &params.values);
            let var = sigma * sigma;
            acc += (s - m) * (s - m) / var + var.ln();
        }
        let ll = -0.5 * acc;
        if ll.is_nan() { f64::NEG_INFINITY } else { ll }
    }

    /// Parameter name a canonical quantity resolves to on this model.
    pub fn resolve(&self, param: CanonicalParam) -> Option<&str> {
        let alias = self.family.alias(param)?;
        self.param_names
            .iter()
            .find(|n| n.as_str() == alias)
            .map(|n| n.as_str())
    }
}

/// Parameter values checked against a model's parameter names.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamVector<'m> {
    names: &'m [String],
    values: Vec<f64>,
}

impl ParamVector<'_> {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Registry of spectral models in priority order.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<SpectralModel>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model; its position becomes its selection priority.
    pub fn register(&mut self, model: SpectralModel) -> Result<(), FitError> {
        if self.models.iter().any(|m| m.id == model.id) {
            return Err(FitError::DuplicateModel(model.id));
        }
        self.models.push(model);
        Ok(())
    }

    pub fn get(&self, model_id: &str) -> Result<&SpectralModel, FitError> {
        self.models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| FitError::UnknownModel(model_id.to_string()))
    }

    /// Priority rank (0 = preferred on ties).
    pub fn priority(&self, model_id: &str) -> Option<usize> {
        self.models.iter().position(|m| m.id == model_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.id.as_str())
    }

    pub fn models(&self) -> &[SpectralModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve a list of requested ids (empty = all) into priority order.
    pub fn select(&self, requested: &[String]) -> Result<Vec<String>, FitError> {
        if requested.is_empty() {
            return Ok(self.ids().map(str::to_string).collect());
        }
        for id in requested {
            self.get(id)?;
        }
        Ok(self
            .ids()
            .filter(|id| requested.iter().any(|r| r == id))
            .map(str::to_string)
            .collect())
    }

    /// The standard catalog of peaked-spectrum models.
    pub fn standard() -> Self {
        use ModelFamily::*;
        let defs = [
            SpectralModel::new("powlaw", PowerLaw, &["a", "alpha"], spectra::power_law, priors::power_law),
            SpectralModel::new(
                "curvepowlaw",
                PowerLaw,
                &["Snorm", "alpha", "q"],
                spectra::curved_power_law,
                priors::curved_power_law,
            ),
            SpectralModel::new("singSSA", Ssa, &["Snorm", "beta", "peakfreq"], spectra::ssa, priors::absorbed),
            SpectralModel::new(
                "singhomobremss",
                Ffa,
                &["Snorm", "alpha", "freqpeak"],
                spectra::homogeneous_ffa,
                priors::absorbed,
            ),
            SpectralModel::new(
                "internalbremss",
                Ffa,
                &["Snorm", "alpha", "freqpeak"],
                spectra::internal_ffa,
                priors::absorbed,
            ),
            SpectralModel::new(
                "singinhomobremss",
                Ffa,
                &["Snorm", "alpha", "p", "freqpeak"],
                spectra::inhomogeneous_ffa,
                priors::inhomogeneous,
            ),
            SpectralModel::new(
                "singSSAbreakexp",
                Ssa,
                &["Snorm", "beta", "peakfreq", "breakfreq"],
                spectra::ssa_break_exp,
                priors::absorbed_break,
            ),
            SpectralModel::new(
                "singhomobremssbreakexp",
                Ffa,
                &["Snorm", "alpha", "freqpeak", "breakfreq"],
                spectra::homogeneous_ffa_break_exp,
                priors::absorbed_break,
            ),
            SpectralModel::new(
                "singhomobremsscurve",
                Ffa,
                &["Snorm", "alpha", "freqpeak", "q"],
                spectra::homogeneous_ffa_curve,
                priors::absorbed_curve,
            ),
            SpectralModel::new(
                "singinhomobremssbreakexp",
                Ffa,
                &["Snorm", "alpha", "p", "freqpeak", "breakfreq"],
                spectra::inhomogeneous_ffa_break_exp,
                priors::inhomogeneous_break_exp,
            ),
            SpectralModel::new(
                "singhomobremssbreak",
                Ffa,
                &["Snorm", "alpha", "freqpeak", "breakfreq"],
                spectra::homogeneous_ffa_break,
                priors::absorbed_injection_break,
            ),
            SpectralModel::new(
                "singinhomobremsscurve",
                Ffa,
                &["Snorm", "alpha", "p", "freqpeak", "q"],
                spectra::inhomogeneous_ffa_curve,
                priors::inhomogeneous_curve,
            ),
            SpectralModel::new(
                "singinhomobremssbreak",
                Ffa,
                &["Snorm", "alpha", "p", "freqpeak", "breakfreq"],
                spectra::inhomogeneous_ffa_break,
                priors::inhomogeneous_injection_break,
            ),
        ];

        let mut catalog = ModelCatalog::new();
        for model in defs {
            let registered = catalog.register(model);
            debug_assert!(registered.is_ok(), "standard catalog ids collide: {registered:?}");
        }
        catalog
    }
}
