//! Radio spectral model implementations.
//!
//! Spectral forms and prior transforms are small, pure functions so that the
//! fitting code can stay generic; `catalog` ties them to ids and parameter
//! names.

pub mod catalog;
pub mod priors;
pub mod spectra;

pub use catalog::*;
