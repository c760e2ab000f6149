//! Data sources for runs that do not read inputs from disk.

pub mod synthetic;

pub use synthetic::*;
