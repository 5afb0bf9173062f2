//! Command-line parsing for the `sedfit` binary.
//!
//! Argument parsing is kept separate from dispatch (`app`) and from the
//! fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "sedfit", version, about = "Multi-epoch radio SED fitting and Bayesian model selection")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every (epoch, model) cell of each target, then select models and extract series.
    Run(RunArgs),
    /// Aggregate evidence and select models from cached fits only.
    Evidence(EvidenceArgs),
    /// Print one parameter trajectory from cached fits.
    Series(SeriesArgs),
    /// List the model catalog in priority order.
    Models,
}

#[derive(Debug, Args, Clone)]
pub struct ConfigArg {
    /// Pipeline configuration (TOML).
    #[arg(short, long, value_name = "TOML")]
    pub config: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Restrict the run to these targets (repeatable). Default: all configured targets.
    #[arg(short, long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Write every target outcome to a JSON file.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Remove leftover claim files before starting (use after a crash).
    #[arg(long)]
    pub reclaim: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EvidenceArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    #[arg(short, long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SeriesArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    #[arg(short, long)]
    pub target: String,

    /// Model id; must be in the catalog.
    #[arg(short, long)]
    pub model: String,

    /// Canonical parameter name, e.g. "peak frequency" or spectral-index.
    #[arg(short, long)]
    pub param: String,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}
