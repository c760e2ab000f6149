//! Numerical utilities: least squares, order statistics, broadening kernels.

pub mod broaden;
pub mod ols;
pub mod stats;

pub use broaden::*;
pub use ols::*;
pub use stats::*;
