//! Parameter search and polishing.
//!
//! Responsibilities:
//!
//! - build wavelength exclusion masks
//! - fit single grid candidates (bounded least squares on `vsini`)
//! - run the coarse/fine grid search
//! - polish the best parameters segment by segment (Nelder–Mead)

pub mod bounds;
pub mod exec;
pub mod grid;
pub mod lm;
pub mod mask;
pub mod polish;
pub mod runner;
pub mod simplex;

pub use exec::*;
pub use grid::*;
pub use lm::*;
pub use mask::*;
pub use polish::*;
pub use runner::*;
pub use simplex::*;
