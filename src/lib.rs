//! `radio-sed-fit` library crate.
//!
//! The binary (`sedfit`) is a thin wrapper around this library so that:
//!
//! - the fitting engine is testable without spawning processes
//! - the catalog, cache and selection logic are reusable from other tools
//!   (plotting scripts, notebooks via JSON exports)

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
