//! End-to-end search and polish on a small synthetic data set, both in
//! memory and through files on disk.

use std::path::PathBuf;

use specfit::app::pipeline::{DemoConfig, GridConfig, PolishConfig, run_demo, run_grid, run_polish};
use specfit::data::SyntheticConfig;
use specfit::domain::{ExclusionList, RowStatus, VSINI};
use specfit::fit::{PolishOptions, SearchOptions};

fn small_config() -> SyntheticConfig {
    SyntheticConfig {
        teff_grid: vec![5500.0, 5750.0, 6000.0],
        logg_grid: vec![4.0, 4.5],
        fe_grid: vec![0.0, 0.25],
        ..SyntheticConfig::default()
    }
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("specfit-it-{}-{name}", std::process::id()))
}

fn demo_config(write_inputs: Option<PathBuf>) -> DemoConfig {
    DemoConfig {
        synthetic: small_config(),
        exclusions: ExclusionList::new(vec![(5160.0, 5160.5)]).unwrap(),
        coarse_stride: 2,
        segment_width: 20.0,
        search: SearchOptions::default(),
        polish: PolishOptions::default(),
        write_inputs,
    }
}

#[test]
fn demo_searches_and_polishes() {
    let run = run_demo(&demo_config(None)).unwrap();

    let mut keys = run.results.indices();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), run.results.len(), "no row is evaluated twice");
    assert!(run.results.rows().iter().any(|r| r.status == RowStatus::Ok));

    let best = run.best.expect("at least one grid fit succeeds");
    let teff = best.value("teff").unwrap();
    assert!((5500.0..=6000.0).contains(&teff));
    assert!(best.get(VSINI).unwrap().vary);

    assert_eq!(run.segments.len(), 3);
    for seg in run.segments.iter().flatten() {
        assert_eq!(seg.wav.len(), seg.resid.len());
        assert!(seg.value.is_finite());
        assert!(seg.params.value(VSINI).unwrap() >= specfit::domain::VSINI_FLOOR);
    }
}

#[test]
fn file_based_run_matches_in_memory_run() {
    let dir = temp_dir("inputs");
    let demo = run_demo(&demo_config(Some(dir.clone()))).unwrap();

    let grid = run_grid(&GridConfig {
        spectrum: dir.join("spectrum.json"),
        library: dir.join("library.json"),
        table: dir.join("table.csv"),
        exclusions: ExclusionList::new(vec![(5160.0, 5160.5)]).unwrap(),
        coarse: Vec::new(),
        coarse_stride: 2,
        options: SearchOptions::default(),
    })
    .unwrap();

    assert_eq!(grid.indices(), demo.results.indices());
    let a = grid.column_values("rchisq").unwrap();
    let b = demo.results.column_values("rchisq").unwrap();
    for (x, y) in a.iter().zip(&b) {
        if x.is_nan() || y.is_nan() {
            assert!(x.is_nan() && y.is_nan());
        } else {
            assert!((x - y).abs() <= 1e-4 * y.abs().max(1.0), "{x} vs {y}");
        }
    }

    let params_path = dir.join("params.json");
    let best = demo.best.unwrap();
    serde_json::to_writer(std::fs::File::create(&params_path).unwrap(), &best).unwrap();

    let segments = run_polish(&PolishConfig {
        spectrum: dir.join("spectrum.json"),
        library: dir.join("library.json"),
        params: params_path,
        exclusions: ExclusionList::empty(),
        segment_width: 30.0,
        options: PolishOptions::default(),
    })
    .unwrap();
    assert_eq!(segments.len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_library_is_a_resource_error() {
    let dir = temp_dir("missing");
    run_demo(&demo_config(Some(dir.clone()))).unwrap();

    let err = run_grid(&GridConfig {
        spectrum: dir.join("spectrum.json"),
        library: dir.join("nope.json"),
        table: dir.join("table.csv"),
        exclusions: ExclusionList::empty(),
        coarse: vec![0],
        coarse_stride: 2,
        options: SearchOptions::default(),
    })
    .unwrap_err();
    assert_eq!(err.exit_code(), specfit::error::EXIT_RESOURCE);

    let _ = std::fs::remove_dir_all(&dir);
}
