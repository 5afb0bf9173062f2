//! Input/output helpers.
//!
//! - per-epoch flux tables (`flux`)
//! - atomic JSON writes (`export`)

pub mod export;
pub mod flux;

pub use export::*;
pub use flux::*;
