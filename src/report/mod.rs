//! Reporting: parameter trajectories, flux variability and terminal output.

pub mod format;
pub mod series;
pub mod variability;

pub use format::*;
pub use series::*;
pub use variability::*;
