//! Fitting and evidence.
//!
//! Responsibilities:
//!
//! - run one (target, epoch, model) fit through an inference backend, at most once per key
//! - persist posterior summaries atomically in the fit cache
//! - aggregate evidence across epochs and select the best-supported model

pub mod backend;
pub mod cache;
pub mod evidence;
pub mod nested;
pub mod runner;
pub mod selection;

pub use backend::*;
pub use cache::*;
pub use evidence::*;
pub use nested::*;
pub use runner::*;
pub use selection::*;
