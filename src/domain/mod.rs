//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - observed spectra, exclusion lists and library subsets (`types`)
//! - optimizer parameter sets (`params`)
//! - candidate/result tables keyed by row index (`table`)

pub mod params;
pub mod table;
pub mod types;

pub use params::*;
pub use table::*;
pub use types::*;
