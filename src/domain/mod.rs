//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - observation and epoch types (`FluxObservation`, `FluxSet`, `Epoch`)
//! - fit identities and results (`FitKey`, `PosteriorSummary`)
//! - derived records (`EvidenceMatrix`, `ModelSelection`, `ParameterSeries`)
//! - pipeline configuration (`PipelineConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
