//! Terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! details and output changes stay localized.

use crate::app::pipeline::{BatchReport, TargetReport};
use crate::domain::{AggregateEvidence, EvidenceMatrix, ParameterSeries};
use crate::models::ModelCatalog;
use crate::report::FluxVariability;

/// Full per-target summary: evidence table, choice, series and variability.
pub fn format_target_report(report: &TargetReport) -> String {
    let sel = &report.selection;
    let mut out = String::new();

    out.push_str(&format!("=== sedfit - {} ===\n", report.target));
    out.push_str(&format!(
        "Epochs: {} | expected with data: {}\n",
        report.matrix.epochs.len(),
        sel.aggregate.expected_epoch_count
    ));

    out.push_str("\nEvidence (logZ per epoch, aggregate):\n");
    out.push_str(&format_evidence_table(&report.matrix, &sel.aggregate, &sel.chosen_model));

    out.push_str("\nChosen model:\n");
    out.push_str(&format!("- {}\n", sel.chosen_model));
    match &sel.runner_up {
        Some(r) => out.push_str(&format!("- Bayes factor vs {r}: {}\n", fmt_num(sel.bayes_factor, 3))),
        None => out.push_str("- Bayes factor: inf (only viable model)\n"),
    }

    for series in &report.series {
        out.push('\n');
        out.push_str(&format_series(series));
    }

    out.push('\n');
    out.push_str(&format_variability(&report.variability));

    if !report.failures.is_empty() {
        out.push_str(&format!("\nFailed cells ({}):\n", report.failures.len()));
        for f in &report.failures {
            out.push_str(&format!("  {}/{}: {}\n", f.epoch, f.model_id, f.message));
        }
    }
    out
}

/// Model rows with one column per epoch; `*` marks the chosen model.
pub fn format_evidence_table(matrix: &EvidenceMatrix, aggregate: &AggregateEvidence, chosen: &str) -> String {
    let mut out = String::new();
    let mut header = format!("  {:<26}", "model");
    for e in &matrix.epochs {
        header.push_str(&format!(" {:>10}", truncate(&e.label, 10)));
    }
    header.push_str(&format!(" {:>10}", "aggregate"));
    out.push_str(header.trim_end());
    out.push('\n');

    for row in &matrix.rows {
        let mark = if row.model_id == chosen { "*" } else { " " };
        let mut line = format!("{mark} {:<26}", truncate(&row.model_id, 26));
        for v in &row.logz {
            line.push_str(&format!(" {:>10}", fmt_num(*v, 2)));
        }
        let agg = aggregate.get(&row.model_id).unwrap_or(f64::NAN);
        line.push_str(&format!(" {:>10}", fmt_num(agg, 3)));
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub fn format_series(series: &ParameterSeries) -> String {
    let mut out = format!(
        "{} ({} of {}):\n",
        capitalize(&series.canonical_name),
        series.param_name,
        series.model_id
    );
    for p in &series.points {
        let e = &p.estimate;
        if e.is_missing() {
            out.push_str(&format!("  {:<12} -\n", p.epoch.label));
        } else {
            out.push_str(&format!(
                "  {:<12} {} -{} +{}\n",
                p.epoch.label,
                fmt_num(e.value, 4),
                fmt_num(e.errlo, 4),
                fmt_num(e.errup, 4)
            ));
        }
    }
    out
}

pub fn format_variability(v: &FluxVariability) -> String {
    let mut out = format!("Flux-density variability ({}):\n", v.model_id);
    for row in &v.rows {
        out.push_str(&format!("  {:<10} dS = {} Jy\n", row.label, fmt_num(row.delta, 4)));
    }
    out
}

/// One line per target plus any target-level errors.
pub fn format_batch_summary(batch: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== sedfit batch (run {}) - {} ok, {} failed ===\n",
        batch.run_id,
        batch.reports.len(),
        batch.errors.len()
    ));
    for r in &batch.reports {
        out.push_str(&format!(
            "  {:<20} {:<26} BF={}\n",
            truncate(&r.target, 20),
            r.selection.chosen_model,
            fmt_num(r.selection.bayes_factor, 3)
        ));
    }
    for e in &batch.errors {
        out.push_str(&format!("  {:<20} ERROR {}\n", truncate(&e.target, 20), e.message));
    }
    out
}

pub fn format_catalog(catalog: &ModelCatalog) -> String {
    let mut out = String::new();
    for (rank, model) in catalog.models().iter().enumerate() {
        out.push_str(&format!(
            "{rank:>2} {:<26} {:<10} {}\n",
            model.id(),
            format!("{:?}", model.family()),
            model.param_names().join(", ")
        ));
    }
    out
}

fn fmt_num(v: f64, decimals: usize) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        format!("{v:.decimals$}")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Epoch, EvidenceRow, ModelEvidence, ParamEstimate, SeriesPoint};

    #[test]
    fn evidence_table_marks_choice_and_nan() {
        let matrix = EvidenceMatrix {
            target: "X".into(),
            epochs: Epoch::sequence(&["e1", "e2"]),
            rows: vec![
                EvidenceRow { model_id: "SSA".into(), logz: vec![-20.1, f64::NAN] },
                EvidenceRow { model_id: "FFA".into(), logz: vec![-25.4, f64::NAN] },
            ],
        };
        let aggregate = AggregateEvidence {
            target: "X".into(),
            expected_epoch_count: 2,
            models: vec![
                ModelEvidence { model_id: "SSA".into(), aggregate_logz: -10.05, epochs_with_data: 1 },
                ModelEvidence { model_id: "FFA".into(), aggregate_logz: -12.7, epochs_with_data: 1 },
            ],
        };
        let text = format_evidence_table(&matrix, &aggregate, "SSA");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("* SSA"));
        assert!(lines[1].contains("-20.10") && lines[1].contains("nan") && lines[1].contains("-10.050"));
        assert!(lines[2].starts_with("  FFA"));
    }

    #[test]
    fn series_prints_dash_for_missing_epochs() {
        let epochs = Epoch::sequence(&["e1", "e2"]);
        let series = ParameterSeries {
            target: "X".into(),
            model_id: "singSSA".into(),
            canonical_name: "peak frequency".into(),
            param_name: "peakfreq".into(),
            points: vec![
                SeriesPoint {
                    epoch: epochs[0].clone(),
                    estimate: ParamEstimate { value: 0.25, errlo: 0.01, errup: 0.02 },
                },
                SeriesPoint { epoch: epochs[1].clone(), estimate: ParamEstimate::MISSING },
            ],
        };
        let text = format_series(&series);
        assert!(text.starts_with("Peak frequency (peakfreq of singSSA):"));
        assert!(text.contains("0.2500 -0.0100 +0.0200"));
        assert!(text.lines().last().unwrap().trim_end().ends_with('-'));
    }

    #[test]
    fn catalog_listing_is_in_priority_order() {
        let text = format_catalog(&ModelCatalog::standard());
        let first = text.lines().next().unwrap();
        assert!(first.contains("powlaw") && first.contains("a, alpha"));
        assert_eq!(text.lines().count(), 13);
    }

    #[test]
    fn numbers_render_non_finite_values() {
        assert_eq!(fmt_num(f64::INFINITY, 2), "inf");
        assert_eq!(fmt_num(f64::NAN, 2), "nan");
        assert_eq!(fmt_num(-1.23456, 2), "-1.23");
    }
}
