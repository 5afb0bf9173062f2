//! Bayes-factor model selection.
//!
//! Selection rules:
//! 1. Ignore models whose aggregate evidence is NaN (no data at all)
//! 2. Choose the model with the maximum aggregate `logZ`
//! 3. On an exact tie, keep the model listed first (canonical priority order)
//!
//! The Bayes factor is `exp(best - runner_up)`, `+inf` when no other model is
//! viable, and exactly 1 on a tie.

use serde::Serialize;

use crate::domain::{AggregateEvidence, ModelSelection};
use crate::error::FitError;

/// Jeffreys-scale strength of a Bayes factor, judged on `|ln K|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStrength {
    Inconclusive,
    Weak,
    Moderate,
    Strong,
}

impl EvidenceStrength {
    pub fn from_ln_k(ln_k: f64) -> Self {
        let m = ln_k.abs();
        if m.is_nan() || m < 1.0 {
            EvidenceStrength::Inconclusive
        } else if m < 2.5 {
            EvidenceStrength::Weak
        } else if m < 5.0 {
            EvidenceStrength::Moderate
        } else {
            EvidenceStrength::Strong
        }
    }
}

impl std::fmt::Display for EvidenceStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvidenceStrength::Inconclusive => "inconclusive",
            EvidenceStrength::Weak => "weak",
            EvidenceStrength::Moderate => "moderate",
            EvidenceStrength::Strong => "strong",
        };
        f.write_str(s)
    }
}

/// Pairwise comparison of two models' aggregate evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BayesComparison {
    pub model_a: String,
    pub model_b: String,
    /// `agg(a) - agg(b)`; positive favours `a`.
    pub ln_k: f64,
    pub k: f64,
    pub strength: EvidenceStrength,
}

/// Stateless selector over aggregate evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector;

impl ModelSelector {
    /// Pick the best-supported model.
    ///
    /// `aggregate.models` must be in priority order; it is used for tie-breaks.
    pub fn select(aggregate: &AggregateEvidence) -> Result<ModelSelection, FitError> {
        let mut best: Option<(usize, f64)> = None;
        for (i, m) in aggregate.models.iter().enumerate() {
            let v = m.aggregate_logz;
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((i, v)),
            }
        }
        let (best_idx, best_val) = best.ok_or_else(|| FitError::NoViableModel(aggregate.target.clone()))?;

        let mut runner_up: Option<(usize, f64)> = None;
        for (i, m) in aggregate.models.iter().enumerate() {
            let v = m.aggregate_logz;
            if i == best_idx || v.is_nan() {
                continue;
            }
            match runner_up {
                Some((_, r)) if v <= r => {}
                _ => runner_up = Some((i, v)),
            }
        }

        let bayes_factor = match runner_up {
            None => f64::INFINITY,
            Some((_, second)) if second == best_val => 1.0,
            Some((_, second)) => (best_val - second).exp(),
        };

        Ok(ModelSelection {
            target: aggregate.target.clone(),
            aggregate: aggregate.clone(),
            chosen_model: aggregate.models[best_idx].model_id.clone(),
            runner_up: runner_up.map(|(i, _)| aggregate.models[i].model_id.clone()),
            bayes_factor,
        })
    }

    /// Compare two named models; either may be NaN (giving an inconclusive NaN result).
    pub fn compare(aggregate: &AggregateEvidence, a: &str, b: &str) -> Result<BayesComparison, FitError> {
        let va = aggregate
            .get(a)
            .ok_or_else(|| FitError::UnknownModel(a.to_string()))?;
        let vb = aggregate
            .get(b)
            .ok_or_else(|| FitError::UnknownModel(b.to_string()))?;
        let ln_k = if va == vb { 0.0 } else { va - vb };
        Ok(BayesComparison {
            model_a: a.to_string(),
            model_b: b.to_string(),
            ln_k,
            k: ln_k.exp(),
            strength: EvidenceStrength::from_ln_k(ln_k),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelEvidence;
    use approx::assert_relative_eq;

    fn agg(values: &[(&str, f64)]) -> AggregateEvidence {
        AggregateEvidence {
            target: "X".into(),
            expected_epoch_count: 3,
            models: values
                .iter()
                .map(|(id, v)| ModelEvidence {
                    model_id: id.to_string(),
                    aggregate_logz: *v,
                    epochs_with_data: usize::from(!v.is_nan()),
                })
                .collect(),
        }
    }

    #[test]
    fn picks_max_and_computes_bayes_factor_against_runner_up() {
        let sel = ModelSelector::select(&agg(&[("A", -7.33), ("B", -9.0), ("C", f64::NAN)])).unwrap();
        assert_eq!(sel.chosen_model, "A");
        assert_eq!(sel.runner_up.as_deref(), Some("B"));
        assert_relative_eq!(sel.bayes_factor, 1.67f64.exp(), epsilon = 1e-9);
    }

    #[test]
    fn winner_need_not_be_first() {
        let sel = ModelSelector::select(&agg(&[("A", -12.0), ("B", f64::NAN), ("C", -3.0)])).unwrap();
        assert_eq!(sel.chosen_model, "C");
        assert_relative_eq!(sel.bayes_factor, 9.0f64.exp(), epsilon = 1e-6);
    }

    #[test]
    fn single_viable_model_has_infinite_bayes_factor() {
        let sel = ModelSelector::select(&agg(&[("A", -5.0), ("B", f64::NAN)])).unwrap();
        assert_eq!(sel.chosen_model, "A");
        assert_eq!(sel.runner_up, None);
        assert_eq!(sel.bayes_factor, f64::INFINITY);
    }

    #[test]
    fn all_nan_is_no_viable_model() {
        let err = ModelSelector::select(&agg(&[("A", f64::NAN), ("B", f64::NAN)])).unwrap_err();
        assert!(matches!(err, FitError::NoViableModel(t) if t == "X"));
    }

    #[test]
    fn ties_go_to_priority_order() {
        let sel = ModelSelector::select(&agg(&[("simple", -4.0), ("complex", -4.0)])).unwrap();
        assert_eq!(sel.chosen_model, "simple");
        assert_eq!(sel.bayes_factor, 1.0);

        let sel = ModelSelector::select(&agg(&[("A", f64::NEG_INFINITY), ("B", f64::NEG_INFINITY)])).unwrap();
        assert_eq!(sel.chosen_model, "A");
        assert_eq!(sel.bayes_factor, 1.0);
    }

    #[test]
    fn negative_infinity_is_eligible_but_loses() {
        let sel = ModelSelector::select(&agg(&[("A", f64::NEG_INFINITY), ("B", -100.0)])).unwrap();
        assert_eq!(sel.chosen_model, "B");
        assert_eq!(sel.bayes_factor, f64::INFINITY);

        let sel = ModelSelector::select(&agg(&[("A", f64::NEG_INFINITY), ("B", f64::NAN)])).unwrap();
        assert_eq!(sel.chosen_model, "A");
    }

    #[test]
    fn pairwise_comparison_uses_jeffreys_scale() {
        let a = agg(&[("A", -10.0), ("B", -13.0), ("C", -10.5), ("D", f64::NAN)]);
        let ab = ModelSelector::compare(&a, "A", "B").unwrap();
        assert_relative_eq!(ab.ln_k, 3.0);
        assert_eq!(ab.strength, EvidenceStrength::Moderate);
        assert_eq!(ModelSelector::compare(&a, "B", "A").unwrap().strength, EvidenceStrength::Moderate);
        assert_eq!(ModelSelector::compare(&a, "A", "C").unwrap().strength, EvidenceStrength::Inconclusive);
        assert_eq!(ModelSelector::compare(&a, "A", "D").unwrap().strength, EvidenceStrength::Inconclusive);
        assert!(ModelSelector::compare(&a, "A", "Z").is_err());
    }

    #[test]
    fn strength_thresholds() {
        assert_eq!(EvidenceStrength::from_ln_k(0.99), EvidenceStrength::Inconclusive);
        assert_eq!(EvidenceStrength::from_ln_k(-1.0), EvidenceStrength::Weak);
        assert_eq!(EvidenceStrength::from_ln_k(2.5), EvidenceStrength::Moderate);
        assert_eq!(EvidenceStrength::from_ln_k(5.0), EvidenceStrength::Strong);
    }
}
