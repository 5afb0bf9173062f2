//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads and validates the pipeline configuration
//! - runs the fit grid / evidence / series commands
//! - prints reports and writes optional exports

use clap::Parser;
use log::info;

use crate::cli::{Command, EvidenceArgs, RunArgs, SeriesArgs};
use crate::domain::{PipelineConfig, TargetConfig};
use crate::error::{AppError, FitError};
use crate::fit::{FitCache, NestedSampler};
use crate::io::{CsvFluxProvider, write_json_atomic};
use crate::models::{CanonicalParam, ModelCatalog};
use crate::report::ParameterTimeSeries;

pub mod pipeline;
pub mod scheduler;

use pipeline::{BatchReport, Pipeline};
use scheduler::WorkerPool;

/// Entry point for the `sedfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    let catalog = ModelCatalog::standard();

    match cli.command {
        Command::Run(args) => handle_run(args, &catalog),
        Command::Evidence(args) => handle_evidence(args, &catalog),
        Command::Series(args) => handle_series(args, &catalog),
        Command::Models => {
            print!("{}", crate::report::format_catalog(&catalog));
            Ok(())
        }
    }
}

fn handle_run(args: RunArgs, catalog: &ModelCatalog) -> Result<(), AppError> {
    let config = PipelineConfig::load(&args.config.config)?;
    let targets = select_targets(&config, &args.targets)?;

    if args.reclaim {
        let removed = FitCache::new(&config.cache_dir).clear_claims()?;
        info!("removed {removed} claim file(s)");
    }

    let backend = NestedSampler::new(&config.sampler);
    let provider = CsvFluxProvider::new(&config.flux_dir);
    let pipeline = Pipeline::new(&config, catalog, &backend, &provider)?;
    let pool = WorkerPool::new(config.worker_count())?;

    let batch = pipeline.run_batch(&targets, |t| pipeline.run_target(t, &pool));
    finish(&batch, args.export.as_deref())
}

fn handle_evidence(args: EvidenceArgs, catalog: &ModelCatalog) -> Result<(), AppError> {
    let config = PipelineConfig::load(&args.config.config)?;
    let targets = select_targets(&config, &args.targets)?;

    // Never invoked: evaluation reads the cache only.
    let backend = NestedSampler::new(&config.sampler);
    let provider = CsvFluxProvider::new(&config.flux_dir);
    let pipeline = Pipeline::new(&config, catalog, &backend, &provider)?;

    let batch = pipeline.run_batch(&targets, |t| pipeline.evaluate_target(t));
    finish(&batch, args.export.as_deref())
}

fn handle_series(args: SeriesArgs, catalog: &ModelCatalog) -> Result<(), AppError> {
    let config = PipelineConfig::load(&args.config.config)?;
    let target = config
        .target(&args.target)
        .ok_or_else(|| FitError::Config(format!("Unknown target '{}'.", args.target)))?;
    let param: CanonicalParam = args.param.parse()?;

    let cache = FitCache::new(&config.cache_dir);
    let extractor = ParameterTimeSeries::new(&cache, catalog, config.run_id);
    let series = extractor.extract_for(target, &args.model, param, &config.epoch_sequence())?;

    if args.json {
        let text = serde_json::to_string_pretty(&series).map_err(FitError::from)?;
        println!("{text}");
    } else {
        print!("{}", crate::report::format_series(&series));
    }
    Ok(())
}

fn select_targets<'c>(config: &'c PipelineConfig, names: &[String]) -> Result<Vec<&'c TargetConfig>, AppError> {
    if names.is_empty() {
        return Ok(config.targets.iter().collect());
    }
    names
        .iter()
        .map(|n| {
            config
                .target(n)
                .ok_or_else(|| AppError::from(FitError::Config(format!("Unknown target '{n}'."))))
        })
        .collect()
}

/// Print, export, and map "every target failed" to a non-zero exit.
fn finish(batch: &BatchReport, export: Option<&std::path::Path>) -> Result<(), AppError> {
    for report in &batch.reports {
        println!("{}", crate::report::format_target_report(report));
    }
    println!("{}", crate::report::format_batch_summary(batch));

    if let Some(path) = export {
        write_json_atomic(path, batch)?;
        info!("wrote {}", path.display());
    }

    batch.status()?;
    Ok(())
}
