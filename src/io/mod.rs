//! Input/output helpers.
//!
//! - spectral library loading (`library`)
//! - spectrum / table / parameter inputs (`inputs`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod inputs;
pub mod library;

pub use export::*;
pub use inputs::*;
pub use library::*;
