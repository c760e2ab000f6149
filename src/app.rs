//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - turns them into search/polish options
//! - runs the pipeline
//! - prints reports and writes optional exports

use std::time::Duration;

use clap::Parser;

use crate::cli::{Command, DemoArgs, GridArgs, PolishArgs, RunArgs};
use crate::data::SyntheticConfig;
use crate::domain::ExclusionList;
use crate::error::AppError;
use crate::fit::{CancelToken, FitLimits, LeastSquaresOptions, PolishOptions, SearchOptions};
use crate::models::Objective;

pub mod pipeline;

/// Entry point for the `specfit` binary.
pub fn run() -> Result<(), AppError> {
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Grid(args) => handle_grid(args),
        Command::Polish(args) => handle_polish(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_grid(args: GridArgs) -> Result<(), AppError> {
    let config = grid_config_from_args(&args)?;
    let results = pipeline::run_grid(&config)?;

    println!("{}", crate::report::format_grid_summary(&results, args.best));

    if let Some(path) = &args.export {
        crate::io::write_results_csv(path, &results)?;
    }
    Ok(())
}

fn handle_polish(args: PolishArgs) -> Result<(), AppError> {
    let config = pipeline::PolishConfig {
        spectrum: args.spectrum.clone(),
        library: args.library.clone(),
        params: args.params.clone(),
        exclusions: exclusions_from_args(&args.run)?,
        segment_width: args.segment_width,
        options: polish_options_from_args(&args.run, args.objective),
    };
    let segments = pipeline::run_polish(&config)?;

    println!("{}", crate::report::format_polish_summary(&segments));

    if let Some(path) = &args.export_json {
        crate::io::write_polish_json(path, &segments, args.objective)?;
    }
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let synthetic = SyntheticConfig::default();
    let mut truth = synthetic.truth;
    truth[3] = args.vsini;
    let config = pipeline::DemoConfig {
        synthetic: SyntheticConfig {
            truth,
            snr: args.snr,
            seed: args.seed,
            ..synthetic
        },
        exclusions: exclusions_from_args(&args.run)?,
        coarse_stride: args.coarse_stride,
        segment_width: args.segment_width,
        search: search_options_from_run(&args.run, SearchOptions::default()),
        polish: polish_options_from_args(&args.run, Objective::Chi2Med),
        write_inputs: args.write_inputs.clone(),
    };
    let run = pipeline::run_demo(&config)?;

    let [teff, logg, fe, vsini] = config.synthetic.truth;
    println!("Truth: teff={teff:.0} logg={logg:.2} fe={fe:+.2} vsini={vsini:.2}");
    println!("{}", crate::report::format_grid_summary(&run.results, 10));
    if !run.segments.is_empty() {
        println!("{}", crate::report::format_polish_summary(&run.segments));
    }

    if let Some(path) = &args.export {
        crate::io::write_results_csv(path, &run.results)?;
    }
    if let Some(path) = &args.export_json {
        crate::io::write_polish_json(path, &run.segments, config.polish.objective)?;
    }
    Ok(())
}

pub fn grid_config_from_args(args: &GridArgs) -> Result<pipeline::GridConfig, AppError> {
    let base = SearchOptions {
        top_k: args.top_k,
        lsq: LeastSquaresOptions {
            xtol: args.xtol,
            ..LeastSquaresOptions::default()
        },
        ..SearchOptions::default()
    };
    Ok(pipeline::GridConfig {
        spectrum: args.spectrum.clone(),
        library: args.library.clone(),
        table: args.table.clone(),
        exclusions: exclusions_from_args(&args.run)?,
        coarse: args.coarse.clone(),
        coarse_stride: args.coarse_stride,
        options: search_options_from_run(&args.run, base),
    })
}

fn search_options_from_run(run: &RunArgs, base: SearchOptions) -> SearchOptions {
    SearchOptions {
        node_spacing: run.node_spacing,
        execution: run.execution,
        limits: limits_from_args(run),
        cancel: CancelToken::new(),
        ..base
    }
}

pub fn polish_options_from_args(run: &RunArgs, objective: Objective) -> PolishOptions {
    PolishOptions {
        node_spacing: run.node_spacing,
        objective,
        execution: run.execution,
        limits: limits_from_args(run),
        ..PolishOptions::default()
    }
}

fn limits_from_args(run: &RunArgs) -> FitLimits {
    FitLimits {
        deadline: run.deadline_ms.map(Duration::from_millis),
    }
}

fn exclusions_from_args(run: &RunArgs) -> Result<ExclusionList, AppError> {
    ExclusionList::new(run.exclude.clone())
}

/// Rewrite argv so `specfit` defaults to `specfit demo`.
///
/// Rules:
/// - `specfit`                       -> `specfit demo`
/// - `specfit --seed 3 ...`          -> `specfit demo --seed 3 ...`
/// - `specfit --help/--version/-h`   -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("demo".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "demo".to_string());
    }
    argv
}
