//! `specfit` library crate: stellar parameter search against a spectral
//! library.
//!
//! The binary (`specfit`) is a thin wrapper around this library so that:
//!
//! - the search and polish engines are testable without spawning processes
//! - the engines can be driven from other front-ends with their own match
//!   implementations

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
