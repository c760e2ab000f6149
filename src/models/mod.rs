//! Spectral models.
//!
//! - `matcher`: the match contract driven by the engines, plus the
//!   library-backed implementation
//! - `library`: library grid interpolation onto the observed grid
//! - `spline`: continuum node parameters
//! - `objective`: scalar objectives for polishing

pub mod library;
pub mod matcher;
pub mod objective;
pub mod spline;

pub use library::*;
pub use matcher::*;
pub use objective::*;
pub use spline::*;
