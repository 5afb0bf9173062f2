//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between fit jobs and the aggregation stages
//! - persisted in the fit cache (`PosteriorSummary`)
//! - exported to JSON for plotting/reporting code

use std::cmp::Ordering;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An observing epoch.
///
/// The label is opaque (it is also the cache directory name); the total order
/// comes from the position of the epoch in the configured epoch sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Epoch {
    pub index: usize,
    pub label: String,
}

impl Epoch {
    pub fn new(index: usize, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
        }
    }

    /// Build the ordered epoch sequence from configured labels.
    pub fn sequence<S: AsRef<str>>(labels: &[S]) -> Vec<Epoch> {
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| Epoch::new(i, l.as_ref()))
            .collect()
    }
}

impl Ord for Epoch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for Epoch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

/// A single flux-density measurement (GHz, Jy, Jy).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxObservation {
    pub frequency: f64,
    pub flux: f64,
    pub sigma: f64,
}

impl FluxObservation {
    fn is_usable(&self) -> bool {
        self.frequency.is_finite()
            && self.flux.is_finite()
            && self.sigma.is_finite()
            && self.frequency > 0.0
            && self.sigma > 0.0
    }
}

/// Zip parallel `(frequency, flux, sigma)` arrays into observations.
///
/// Returns `None` when the arrays are not the same length.
pub fn observations_from_arrays(
    frequency: &[f64],
    flux: &[f64],
    sigma: &[f64],
) -> Option<Vec<FluxObservation>> {
    if frequency.len() != flux.len() || flux.len() != sigma.len() {
        return None;
    }
    Some(
        frequency
            .iter()
            .zip(flux)
            .zip(sigma)
            .map(|((&frequency, &flux), &sigma)| FluxObservation {
                frequency,
                flux,
                sigma,
            })
            .collect(),
    )
}

/// Masked spectrum handed to a likelihood.
///
/// Invariant: the three arrays have identical length and hold only finite
/// values, with `frequency > 0` and `sigma > 0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxSet {
    frequency: Vec<f64>,
    flux: Vec<f64>,
    sigma: Vec<f64>,
}

impl FluxSet {
    /// Drop every observation with a NaN (or otherwise unusable) entry.
    pub fn masked(observations: &[FluxObservation]) -> Self {
        let mut out = FluxSet::default();
        for obs in observations.iter().filter(|o| o.is_usable()) {
            out.frequency.push(obs.frequency);
            out.flux.push(obs.flux);
            out.sigma.push(obs.sigma);
        }
        out
    }

    pub fn frequency(&self) -> &[f64] {
        &self.frequency
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }
}

/// Identity of one fit run: `(target, epoch, model, run_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FitKey {
    pub target: String,
    pub epoch: String,
    pub model_id: String,
    pub run_id: u32,
}

impl FitKey {
    pub fn new(
        target: impl Into<String>,
        epoch: impl Into<String>,
        model_id: impl Into<String>,
        run_id: u32,
    ) -> Self {
        Self {
            target: target.into(),
            epoch: epoch.into(),
            model_id: model_id.into(),
            run_id,
        }
    }

    /// `{target}/{epoch}/{model_id}/run{run_id}` relative to the cache root.
    pub fn run_dir(&self) -> PathBuf {
        PathBuf::from(&self.target)
            .join(&self.epoch)
            .join(&self.model_id)
            .join(format!("run{}", self.run_id))
    }
}

impl std::fmt::Display for FitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/run{}",
            self.target, self.epoch, self.model_id, self.run_id
        )
    }
}

/// Posterior summary of one fit run.
///
/// `errlo`/`errup` are non-negative distances from the median to the lower and
/// upper credible bounds. A summary whose numbers are all NaN is the
/// "no data this epoch" sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SummaryFile", into = "SummaryFile")]
pub struct PosteriorSummary {
    pub param_names: Vec<String>,
    pub max_likelihood_point: Vec<f64>,
    pub median: Vec<f64>,
    pub stdev: Vec<f64>,
    pub errlo: Vec<f64>,
    pub errup: Vec<f64>,
    pub logz: f64,
}

impl PosteriorSummary {
    /// Sentinel returned (and cached) when an epoch has no usable data.
    pub fn no_data(param_names: &[String]) -> Self {
        let nan = vec![f64::NAN; param_names.len()];
        Self {
            param_names: param_names.to_vec(),
            max_likelihood_point: nan.clone(),
            median: nan.clone(),
            stdev: nan.clone(),
            errlo: nan.clone(),
            errup: nan,
            logz: f64::NAN,
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.logz.is_nan() && self.median.iter().all(|v| v.is_nan())
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    /// `(median, errlo, errup)` for a named parameter.
    pub fn estimate(&self, name: &str) -> Option<ParamEstimate> {
        let i = self.param_index(name)?;
        Some(ParamEstimate {
            value: self.median.get(i).copied().unwrap_or(f64::NAN),
            errlo: self.errlo.get(i).copied().unwrap_or(f64::NAN),
            errup: self.errup.get(i).copied().unwrap_or(f64::NAN),
        })
    }

    /// Checks the array lengths against `param_names`.
    pub fn is_consistent(&self) -> bool {
        let n = self.param_names.len();
        [
            &self.max_likelihood_point,
            &self.median,
            &self.stdev,
            &self.errlo,
            &self.errup,
        ]
        .iter()
        .all(|v| v.len() == n)
    }
}

/// A point estimate with asymmetric uncertainties. NaN means "no measurement".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    #[serde(with = "nan_as_null")]
    pub value: f64,
    #[serde(with = "nan_as_null")]
    pub errlo: f64,
    #[serde(with = "nan_as_null")]
    pub errup: f64,
}

impl ParamEstimate {
    pub const MISSING: ParamEstimate = ParamEstimate {
        value: f64::NAN,
        errlo: f64::NAN,
        errup: f64::NAN,
    };

    pub fn is_missing(&self) -> bool {
        self.value.is_nan()
    }
}

/// On-disk layout of `info/results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SummaryFile {
    paramnames: Vec<String>,
    maximum_likelihood: MaxLikelihoodBlock,
    posterior: PosteriorBlock,
    #[serde(with = "nan_as_null")]
    logz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MaxLikelihoodBlock {
    #[serde(with = "nan_as_null::vec")]
    point: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PosteriorBlock {
    #[serde(with = "nan_as_null::vec")]
    median: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    stdev: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    errlo: Vec<f64>,
    #[serde(with = "nan_as_null::vec")]
    errup: Vec<f64>,
}

impl From<SummaryFile> for PosteriorSummary {
    fn from(file: SummaryFile) -> Self {
        Self {
            param_names: file.paramnames,
            max_likelihood_point: file.maximum_likelihood.point,
            median: file.posterior.median,
            stdev: file.posterior.stdev,
            errlo: file.posterior.errlo,
            errup: file.posterior.errup,
            logz: file.logz,
        }
    }
}

impl From<PosteriorSummary> for SummaryFile {
    fn from(s: PosteriorSummary) -> Self {
        Self {
            paramnames: s.param_names,
            maximum_likelihood: MaxLikelihoodBlock {
                point: s.max_likelihood_point,
            },
            posterior: PosteriorBlock {
                median: s.median,
                stdev: s.stdev,
                errlo: s.errlo,
                errup: s.errup,
            },
            logz: s.logz,
        }
    }
}

/// JSON has no NaN or infinity: NaN is written as `null`, `±inf` as the
/// strings `"inf"` / `"-inf"`, so every value reads back as it was written.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    fn decode<E: serde::de::Error>(raw: Option<Raw>) -> Result<f64, E> {
        match raw {
            None => Ok(f64::NAN),
            Some(Raw::Number(v)) => Ok(v),
            Some(Raw::Text(t)) => t
                .parse::<f64>()
                .map_err(|_| E::custom(format!("expected a number, null, \"inf\" or \"-inf\", got {t:?}"))),
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else if value.is_infinite() {
            serializer.serialize_str(&value.to_string())
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        decode(Option::<Raw>::deserialize(deserializer)?)
    }

    pub mod vec {
        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        struct Element(f64);

        impl Serialize for Element {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                super::serialize(&self.0, serializer)
            }
        }

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for &v in values {
                seq.serialize_element(&Element(v))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            Vec::<Option<super::Raw>>::deserialize(deserializer)?
                .into_iter()
                .map(super::decode::<D::Error>)
                .collect()
        }
    }
}

/// Per-target evidence grid: `model → epoch → logZ` (NaN when absent).
///
/// Rows follow model priority order, columns follow the epoch sequence.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceMatrix {
    pub target: String,
    pub epochs: Vec<Epoch>,
    pub rows: Vec<EvidenceRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRow {
    pub model_id: String,
    #[serde(with = "nan_as_null::vec")]
    pub logz: Vec<f64>,
}

impl EvidenceMatrix {
    pub fn get(&self, model_id: &str, epoch: &Epoch) -> Option<f64> {
        let col = self.epochs.iter().position(|e| e == epoch)?;
        let row = self.rows.iter().find(|r| r.model_id == model_id)?;
        row.logz.get(col).copied()
    }

    pub fn row(&self, model_id: &str) -> Option<&EvidenceRow> {
        self.rows.iter().find(|r| r.model_id == model_id)
    }
}

/// Aggregate evidence of one model over a target's epochs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEvidence {
    pub model_id: String,
    #[serde(with = "nan_as_null")]
    pub aggregate_logz: f64,
    /// Number of epochs that contributed a finite logZ.
    pub epochs_with_data: usize,
}

/// Aggregated evidence for all candidate models of a target, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateEvidence {
    pub target: String,
    pub expected_epoch_count: usize,
    pub models: Vec<ModelEvidence>,
}

impl AggregateEvidence {
    pub fn get(&self, model_id: &str) -> Option<f64> {
        self.models
            .iter()
            .find(|m| m.model_id == model_id)
            .map(|m| m.aggregate_logz)
    }

    /// Models sorted by decreasing aggregate evidence (NaN last, priority order kept on ties).
    pub fn ranked(&self) -> Vec<&ModelEvidence> {
        let mut out: Vec<&ModelEvidence> = self.models.iter().collect();
        out.sort_by(|a, b| match (a.aggregate_logz.is_nan(), b.aggregate_logz.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => b
                .aggregate_logz
                .partial_cmp(&a.aggregate_logz)
                .unwrap_or(Ordering::Equal),
        });
        out
    }
}

/// Outcome of Bayes-factor model selection for a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSelection {
    pub target: String,
    pub aggregate: AggregateEvidence,
    pub chosen_model: String,
    pub runner_up: Option<String>,
    /// `exp(best - second best)`; `+inf` when only one model is viable.
    #[serde(serialize_with = "nan_as_null::serialize")]
    pub bayes_factor: f64,
}

/// One epoch of a parameter trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub epoch: Epoch,
    #[serde(flatten)]
    pub estimate: ParamEstimate,
}

/// Per-epoch trajectory of a named parameter of the chosen model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSeries {
    pub target: String,
    pub model_id: String,
    /// Canonical name requested by the caller (e.g. "spectral index").
    pub canonical_name: String,
    /// Model-specific parameter it resolved to (e.g. "beta").
    pub param_name: String,
    pub points: Vec<SeriesPoint>,
}

impl ParameterSeries {
    pub fn at(&self, epoch: &Epoch) -> Option<ParamEstimate> {
        self.points
            .iter()
            .find(|p| &p.epoch == epoch)
            .map(|p| p.estimate)
    }
}

/// A grid cell that ended in error (recorded as NaN evidence).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFailure {
    pub epoch: String,
    pub model_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_drops_nan_rows_and_keeps_arrays_aligned() {
        let obs = observations_from_arrays(
            &[0.1, 0.2, f64::NAN, 5.5],
            &[1.0, f64::NAN, 2.0, 0.5],
            &[0.1, 0.1, 0.1, 0.05],
        )
        .unwrap();
        let set = FluxSet::masked(&obs);
        assert_eq!(set.len(), 2);
        assert_eq!(set.frequency().len(), set.flux().len());
        assert_eq!(set.flux().len(), set.sigma().len());
        assert!(set.frequency().iter().chain(set.flux()).chain(set.sigma()).all(|v| !v.is_nan()));
        assert_eq!(set.frequency(), &[0.1, 5.5]);
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        assert!(observations_from_arrays(&[1.0], &[1.0, 2.0], &[0.1]).is_none());
    }

    #[test]
    fn epochs_order_by_sequence_not_label() {
        let seq = Epoch::sequence(&["Mar20", "Jan21", "Apr20"]);
        let mut sorted = seq.clone();
        sorted.sort();
        assert_eq!(sorted, seq);
        assert!(seq[2] > seq[1]);
    }

    #[test]
    fn fit_key_run_dir_layout() {
        let key = FitKey::new("J020507", "Jan20", "singSSA", 1);
        assert_eq!(key.run_dir(), PathBuf::from("J020507/Jan20/singSSA/run1"));
    }

    #[test]
    fn summary_json_uses_results_layout_and_null_for_nan() {
        let names = vec!["Snorm".to_string(), "beta".to_string()];
        let sentinel = PosteriorSummary::no_data(&names);
        let json = serde_json::to_value(&sentinel).unwrap();
        assert_eq!(json["paramnames"][1], "beta");
        assert!(json["logz"].is_null());
        assert!(json["posterior"]["errlo"][0].is_null());
        assert!(json["maximum_likelihood"]["point"].is_array());

        let back: PosteriorSummary = serde_json::from_value(json).unwrap();
        assert!(back.is_no_data());
        assert!(back.is_consistent());
    }

    #[test]
    fn infinite_values_survive_a_json_round_trip() {
        let names = vec!["Snorm".to_string()];
        let mut s = PosteriorSummary::no_data(&names);
        s.logz = f64::NEG_INFINITY;
        s.median = vec![f64::INFINITY];
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["logz"], "-inf");
        assert_eq!(json["posterior"]["median"][0], "inf");
        assert!(json["posterior"]["stdev"][0].is_null());

        let back: PosteriorSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back.logz, f64::NEG_INFINITY);
        assert_eq!(back.median, vec![f64::INFINITY]);
        assert!(back.stdev[0].is_nan());
        assert!(!back.is_no_data());
    }

    #[test]
    fn unknown_text_in_a_number_field_is_rejected() {
        let json = serde_json::json!({
            "paramnames": ["Snorm"],
            "maximum_likelihood": {"point": [1.0]},
            "posterior": {"median": ["lots"], "stdev": [0.1], "errlo": [0.1], "errup": [0.1]},
            "logz": -3.0
        });
        assert!(serde_json::from_value::<PosteriorSummary>(json).is_err());
    }

    #[test]
    fn aggregate_ranking_puts_nan_last() {
        let agg = AggregateEvidence {
            target: "X".into(),
            expected_epoch_count: 2,
            models: vec![
                ModelEvidence { model_id: "A".into(), aggregate_logz: f64::NAN, epochs_with_data: 0 },
                ModelEvidence { model_id: "B".into(), aggregate_logz: -3.0, epochs_with_data: 1 },
                ModelEvidence { model_id: "C".into(), aggregate_logz: -1.0, epochs_with_data: 2 },
            ],
        };
        let order: Vec<&str> = agg.ranked().iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }
}
