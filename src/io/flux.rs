//! Flux-density tables.
//!
//! `FluxProvider` is the seam between the fitting engine and whatever
//! assembles per-epoch spectra. `CsvFluxProvider` reads one CSV per
//! `(target, epoch)` from `{flux_dir}/{target}/{epoch}.csv`.
//!
//! Accepted columns (case-insensitive, BOM-tolerant):
//! - frequency: `frequency`, `freq`, `freq_ghz`, `nu` (GHz)
//! - flux: `flux`, `flux_jy`, `s` (Jy)
//! - uncertainty: `sigma`, `flux_err`, `err`; or `rms`, combined in
//!   quadrature with a 2% flux-scale error
//!
//! Empty or unparseable cells become NaN and are masked later by `FluxSet`.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::domain::{Epoch, FluxObservation};
use crate::error::FitError;

/// Fractional flux-scale uncertainty added to `rms` columns.
pub const FLUX_SCALE_ERROR: f64 = 0.02;

/// Source of flux-density measurements for one target and epoch.
pub trait FluxProvider: Send + Sync {
    /// Observations for `(target, epoch)`; may contain NaN entries.
    ///
    /// `DataUnavailable` means "nothing observed"; the runner treats it like an
    /// empty table.
    fn get(&self, target: &str, epoch: &Epoch) -> Result<Vec<FluxObservation>, FitError>;
}

/// CSV tables laid out as `{root}/{target}/{epoch}.csv`.
#[derive(Debug, Clone)]
pub struct CsvFluxProvider {
    root: PathBuf,
}

impl CsvFluxProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn table_path(&self, target: &str, epoch: &Epoch) -> PathBuf {
        self.root.join(target).join(format!("{}.csv", epoch.label))
    }
}

impl FluxProvider for CsvFluxProvider {
    fn get(&self, target: &str, epoch: &Epoch) -> Result<Vec<FluxObservation>, FitError> {
        let path = self.table_path(target, epoch);
        if !path.exists() {
            return Err(FitError::DataUnavailable {
                target: target.to_string(),
                epoch: epoch.label.clone(),
                reason: format!("no flux table at '{}'", path.display()),
            });
        }
        read_flux_table(&path)
    }
}

#[derive(Debug, Clone, Copy)]
enum Uncertainty {
    Sigma(usize),
    Rms(usize),
}

/// Parse a flux table.
pub fn read_flux_table(path: &Path) -> Result<Vec<FluxObservation>, FitError> {
    let file = File::open(path).map_err(|e| FitError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| FitError::Config(format!("Failed to read headers of '{}': {e}", path.display())))?
        .clone();
    let header_map = build_header_map(&headers);

    let missing = |what: &str| FitError::Config(format!("Flux table '{}' has no {what} column.", path.display()));
    let freq_col = find_column(&header_map, &["frequency", "freq", "freq_ghz", "nu"]).ok_or_else(|| missing("frequency"))?;
    let flux_col = find_column(&header_map, &["flux", "flux_jy", "s"]).ok_or_else(|| missing("flux"))?;
    let err_col = find_column(&header_map, &["sigma", "flux_err", "err"])
        .map(Uncertainty::Sigma)
        .or_else(|| find_column(&header_map, &["rms"]).map(Uncertainty::Rms))
        .ok_or_else(|| missing("sigma/rms"))?;

    let mut out = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                // +2: header line plus 1-based numbering.
                log::warn!("{}:{}: skipping unreadable row: {e}", path.display(), idx + 2);
                continue;
            }
        };
        let frequency = cell(&record, freq_col);
        let flux = cell(&record, flux_col);
        let sigma = match err_col {
            Uncertainty::Sigma(c) => cell(&record, c),
            Uncertainty::Rms(c) => {
                let rms = cell(&record, c);
                (rms * rms + (FLUX_SCALE_ERROR * flux).powi(2)).sqrt()
            }
        };
        out.push(FluxObservation {
            frequency,
            flux,
            sigma,
        });
    }
    Ok(out)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect()
}

fn find_column(map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| map.get(*n).copied())
}

fn cell(record: &StringRecord, col: usize) -> f64 {
    record
        .get(col)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FluxSet;
    use approx::assert_relative_eq;
    use std::fs;

    fn write_table(root: &Path, target: &str, epoch: &str, body: &str) {
        let dir = root.join(target);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{epoch}.csv")), body).unwrap();
    }

    #[test]
    fn reads_sigma_table_and_keeps_nan_cells() {
        let dir = tempfile::tempdir().unwrap();
        write_table(
            dir.path(),
            "J1",
            "Jan20",
            "\u{feff}Freq_GHz,Flux,Sigma\n0.15,1.2,0.1\n0.2,,0.1\n5.5,0.4,0.02\n",
        );
        let provider = CsvFluxProvider::new(dir.path());
        let obs = provider.get("J1", &Epoch::new(0, "Jan20")).unwrap();
        assert_eq!(obs.len(), 3);
        assert!(obs[1].flux.is_nan());
        assert_eq!(FluxSet::masked(&obs).len(), 2);
    }

    #[test]
    fn rms_column_gets_flux_scale_error() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "J1", "e1", "frequency,flux,rms\n1.0,10.0,0.1\n");
        let obs = CsvFluxProvider::new(dir.path()).get("J1", &Epoch::new(0, "e1")).unwrap();
        assert_relative_eq!(obs[0].sigma, (0.01f64 + 0.04).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn missing_table_is_data_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvFluxProvider::new(dir.path())
            .get("J1", &Epoch::new(0, "e9"))
            .unwrap_err();
        assert!(matches!(err, FitError::DataUnavailable { .. }));
    }

    #[test]
    fn missing_flux_column_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "J1", "e1", "frequency,sigma\n1.0,0.1\n");
        let err = CsvFluxProvider::new(dir.path())
            .get("J1", &Epoch::new(0, "e1"))
            .unwrap_err();
        assert!(matches!(err, FitError::Config(_)));
    }
}
