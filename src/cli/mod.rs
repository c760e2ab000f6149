//! Command-line parsing for the spectral parameter search.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::fit::{DEFAULT_TOP_K, DEFAULT_XTOL, Execution};
use crate::models::{DEFAULT_NODE_SPACING, Objective};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "specfit", version, about = "Stellar parameter grid search and polishing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the coarse/fine grid search over a candidate table.
    Grid(GridArgs),
    /// Polish a parameter set segment by segment.
    Polish(PolishArgs),
    /// Generate a synthetic library and spectrum, then search and polish it.
    Demo(DemoArgs),
}

/// Options shared by every command that runs fits.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Wavelength interval to exclude, as `MIN:MAX` (repeatable).
    #[arg(long = "exclude", value_name = "MIN:MAX", value_parser = parse_interval)]
    pub exclude: Vec<(f64, f64)>,

    /// Continuum node spacing (Angstrom).
    #[arg(long, default_value_t = DEFAULT_NODE_SPACING)]
    pub node_spacing: f64,

    /// Serial or parallel evaluation of rows/segments.
    #[arg(long, value_enum, default_value_t = Execution::Serial)]
    pub execution: Execution,

    /// Per-fit wall-clock budget in milliseconds.
    #[arg(long, value_name = "MS")]
    pub deadline_ms: Option<u64>,
}

/// Options for the grid search.
#[derive(Debug, Parser, Clone)]
pub struct GridArgs {
    /// Observed spectrum (JSON: wav, flux, uflux).
    #[arg(long, value_name = "JSON")]
    pub spectrum: PathBuf,

    /// Spectral library (JSON: wav, models).
    #[arg(long, value_name = "JSON")]
    pub library: PathBuf,

    /// Candidate table (CSV with teff, logg, fe, vsini and optional index).
    #[arg(long, value_name = "CSV")]
    pub table: PathBuf,

    /// Explicit coarse row keys (comma-separated). Defaults to every
    /// `--coarse-stride`-th grid value per axis.
    #[arg(long, value_delimiter = ',')]
    pub coarse: Vec<usize>,

    /// Grid-axis stride used to pick coarse rows.
    #[arg(long, default_value_t = 2)]
    pub coarse_stride: usize,

    /// Number of best coarse rows defining the fine-search box.
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Relative step tolerance of the per-row least squares.
    #[arg(long, default_value_t = DEFAULT_XTOL)]
    pub xtol: f64,

    /// Show the best N rows in the summary.
    #[arg(long, default_value_t = 10)]
    pub best: usize,

    /// Export the result table to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options for polishing.
#[derive(Debug, Parser, Clone)]
pub struct PolishArgs {
    /// Observed spectrum (JSON: wav, flux, uflux).
    #[arg(long, value_name = "JSON")]
    pub spectrum: PathBuf,

    /// Spectral library (JSON: wav, models).
    #[arg(long, value_name = "JSON")]
    pub library: PathBuf,

    /// Starting parameters (JSON list of {name, value, vary, min, max}).
    #[arg(long, value_name = "JSON")]
    pub params: PathBuf,

    /// Segment width (Angstrom); the spectrum is split into consecutive
    /// segments of this width.
    #[arg(long, default_value_t = 20.0)]
    pub segment_width: f64,

    /// Objective to minimize.
    #[arg(long, value_enum, default_value_t = Objective::Chi2Med)]
    pub objective: Objective,

    /// Export the per-segment results to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options for the synthetic demo.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Random seed for the synthetic data.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Signal-to-noise ratio of the synthetic observation.
    #[arg(long, default_value_t = 150.0)]
    pub snr: f64,

    /// True vsini of the synthetic observation (km/s).
    #[arg(long, default_value_t = 4.0)]
    pub vsini: f64,

    /// Grid-axis stride used to pick coarse rows.
    #[arg(long, default_value_t = 2)]
    pub coarse_stride: usize,

    /// Polish segment width (Angstrom).
    #[arg(long, default_value_t = 20.0)]
    pub segment_width: f64,

    /// Write the generated library, spectrum and table into this directory.
    #[arg(long, value_name = "DIR")]
    pub write_inputs: Option<PathBuf>,

    /// Export the grid result table to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the polish results to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Parse `MIN:MAX` into an interval.
pub fn parse_interval(s: &str) -> Result<(f64, f64), String> {
    let (lo, hi) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got '{s}'"))?;
    let lo: f64 = lo.trim().parse().map_err(|_| format!("invalid number '{lo}'"))?;
    let hi: f64 = hi.trim().parse().map_err(|_| format!("invalid number '{hi}'"))?;
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_intervals() {
        assert_eq!(parse_interval("5018:5019.5"), Ok((5018.0, 5019.5)));
        assert!(parse_interval("5018").is_err());
        assert!(parse_interval("a:1").is_err());
    }

    #[test]
    fn grid_command_parses_flags() {
        let cli = Cli::parse_from([
            "specfit",
            "grid",
            "--spectrum",
            "s.json",
            "--library",
            "l.json",
            "--table",
            "t.csv",
            "--coarse",
            "0,2,4",
            "--exclude",
            "5018:5019.5",
            "--exclude",
            "5027.5:5028.5",
            "--execution",
            "parallel",
        ]);
        let Command::Grid(args) = cli.command else {
            panic!("expected grid command");
        };
        assert_eq!(args.coarse, vec![0, 2, 4]);
        assert_eq!(args.run.exclude.len(), 2);
        assert_eq!(args.run.execution, Execution::Parallel);
        assert_eq!(args.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn polish_objective_is_a_closed_set() {
        let ok = Cli::try_parse_from(["specfit", "polish", "--spectrum", "s", "--library", "l", "--params", "p", "--objective", "chi2"]);
        assert!(ok.is_ok());
        let bad = Cli::try_parse_from(["specfit", "polish", "--spectrum", "s", "--library", "l", "--params", "p", "--objective", "chi3"]);
        assert!(bad.is_err());
    }
}
