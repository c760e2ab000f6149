//! Terminal reporting: grid progress lines and run summaries.

pub mod format;

pub use format::*;
