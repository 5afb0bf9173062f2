//! Mathematical utilities: special functions and NaN-aware statistics.

pub mod special;
pub mod stats;

pub use special::*;
pub use stats::*;
