//! Shared search/polish workflow used by every subcommand.
//!
//! The flow is always:
//! inputs -> grid search -> best row -> per-segment polish
//!
//! `grid` and `polish` run one half each from files on disk; `demo` runs the
//! whole thing on synthetic data held in memory.

use std::path::{Path, PathBuf};

use crate::data::{SyntheticConfig, SyntheticData, coarse_indices, generate};
use crate::domain::{
    ExclusionList, GRID_PARAMS, LibrarySubset, ParamSet, ParameterTable, RowStatus, Spectrum, VSINI, VSINI_FLOOR,
    VSINI_MAX,
};
use crate::error::AppError;
use crate::fit::{PolishOptions, SearchOptions, SegmentOutcome, grid_search, polish, wavmask};
use crate::io::{
    JsonLibrary, LibrarySource, MemoryLibrary, read_params_json, read_spectrum_json, read_table_csv,
    write_library_json, write_results_csv, write_spectrum_json,
};
use crate::models::{ContinuumMethod, SpectrumMatch};

/// Inputs of a file-based grid search.
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub spectrum: PathBuf,
    pub library: PathBuf,
    pub table: PathBuf,
    pub exclusions: ExclusionList,
    /// Explicit coarse row keys; empty means "pick by stride".
    pub coarse: Vec<usize>,
    pub coarse_stride: usize,
    pub options: SearchOptions,
}

/// Inputs of a file-based polish.
#[derive(Debug, Clone)]
pub struct PolishConfig {
    pub spectrum: PathBuf,
    pub library: PathBuf,
    pub params: PathBuf,
    pub exclusions: ExclusionList,
    pub segment_width: f64,
    pub options: PolishOptions,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub synthetic: SyntheticConfig,
    pub exclusions: ExclusionList,
    pub coarse_stride: usize,
    pub segment_width: f64,
    pub search: SearchOptions,
    pub polish: PolishOptions,
    /// Directory to write the generated inputs into.
    pub write_inputs: Option<PathBuf>,
}

/// Everything a demo run computed.
#[derive(Debug, Clone)]
pub struct DemoRun {
    pub data: SyntheticData,
    pub results: ParameterTable,
    /// Starting point of the polish (`None` if every grid fit failed).
    pub best: Option<ParamSet>,
    pub segments: Vec<SegmentOutcome>,
}

pub fn run_grid(config: &GridConfig) -> Result<ParameterTable, AppError> {
    let spectrum = read_spectrum_json(&config.spectrum)?;
    let table = read_table_csv(&config.table)?;
    log::info!("Read {} candidate rows from '{}'", table.len(), config.table.display());

    let coarse = if config.coarse.is_empty() {
        coarse_indices(&table, config.coarse_stride)?
    } else {
        config.coarse.clone()
    };
    let fine = table.indices();

    grid_search(
        spectrum,
        &JsonLibrary,
        &config.library,
        &config.exclusions,
        &table,
        &coarse,
        &fine,
        &config.options,
    )
}

pub fn run_polish(config: &PolishConfig) -> Result<Vec<SegmentOutcome>, AppError> {
    let spectrum = read_spectrum_json(&config.spectrum)?;
    let initial = read_params_json(&config.params)?;
    let lib = JsonLibrary.load(&config.library, (spectrum.wav_min(), spectrum.wav_max()))?;

    let matches = segment_matches(&spectrum, &lib, &config.exclusions, config.segment_width)?;
    polish(&matches, &initial, &config.options)
}

pub fn run_demo(config: &DemoConfig) -> Result<DemoRun, AppError> {
    let data = generate(&config.synthetic)?;
    log::info!(
        "Synthetic data: {} models, {} samples over {:.1}-{:.1} A",
        data.library.models.len(),
        data.spectrum.len(),
        data.spectrum.wav_min(),
        data.spectrum.wav_max()
    );

    if let Some(dir) = &config.write_inputs {
        write_demo_inputs(dir, &data)?;
    }

    let coarse = coarse_indices(&data.table, config.coarse_stride)?;
    let fine = data.table.indices();
    let source = MemoryLibrary(data.library.clone());
    let results = grid_search(
        data.spectrum.clone(),
        &source,
        Path::new("<memory>"),
        &config.exclusions,
        &data.table,
        &coarse,
        &fine,
        &config.search,
    )?;

    let best = best_params(&results)?;
    let segments = match &best {
        Some(start) => {
            let matches = segment_matches(&data.spectrum, &data.library, &config.exclusions, config.segment_width)?;
            polish(&matches, start, &config.polish)?
        }
        None => {
            log::warn!("Every grid fit failed; skipping polish");
            Vec::new()
        }
    };

    Ok(DemoRun {
        data,
        results,
        best,
        segments,
    })
}

/// Starting parameters from the lowest-`rchisq` successful row: grid
/// parameters fixed, `vsini` free.
pub fn best_params(results: &ParameterTable) -> Result<Option<ParamSet>, AppError> {
    let ok = results.filter(|r| r.status == RowStatus::Ok);
    if ok.is_empty() {
        return Ok(None);
    }
    let sorted = ok.sorted_by("rchisq")?;
    let Some(row) = sorted.rows().first() else {
        return Ok(None);
    };

    let mut params = ParamSet::new();
    for name in GRID_PARAMS {
        let c = sorted.require_column(name)?;
        params.add(name, row.values[c]);
    }
    let c = sorted.require_column(VSINI)?;
    let vsini = params.add(VSINI, row.values[c].clamp(VSINI_FLOOR, VSINI_MAX));
    vsini.vary = true;
    vsini.min = Some(VSINI_FLOOR);
    vsini.max = Some(VSINI_MAX);
    Ok(Some(params))
}

/// Split `[wav_min, wav_max]` into `n` equal segments, `n` being the closest
/// whole number of `width`-wide pieces (at least one).
pub fn segment_bounds(wav_min: f64, wav_max: f64, width: f64) -> Result<Vec<(f64, f64)>, AppError> {
    if !(width.is_finite() && width > 0.0) {
        return Err(AppError::config("Segment width must be positive."));
    }
    if !(wav_max > wav_min) {
        return Err(AppError::config("Spectrum has no wavelength extent."));
    }
    let n = ((wav_max - wav_min) / width).round().max(1.0) as usize;
    let step = (wav_max - wav_min) / n as f64;
    Ok((0..n)
        .map(|i| {
            let lo = wav_min + step * i as f64;
            let hi = if i + 1 == n { wav_max } else { lo + step };
            (lo, hi)
        })
        .collect())
}

/// One spline-continuum match per segment. Segments with every sample
/// excluded are skipped.
pub fn segment_matches(
    spectrum: &Spectrum,
    lib: &LibrarySubset,
    exclusions: &ExclusionList,
    width: f64,
) -> Result<Vec<SpectrumMatch>, AppError> {
    let mut out = Vec::new();
    for (lo, hi) in segment_bounds(spectrum.wav_min(), spectrum.wav_max(), width)? {
        let seg = spectrum.segment(lo, hi)?;
        let mask = wavmask(&seg.wav, exclusions);
        if mask.iter().all(|m| *m) {
            log::warn!("Segment {lo:.1}-{hi:.1} A is fully excluded; skipping");
            continue;
        }
        out.push(SpectrumMatch::new(seg, lib, mask, ContinuumMethod::SplineDd)?);
    }
    log::info!("Polishing {} segments", out.len());
    Ok(out)
}

fn write_demo_inputs(dir: &Path, data: &SyntheticData) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", dir.display())))?;
    write_library_json(&dir.join("library.json"), &data.library)?;
    write_spectrum_json(&dir.join("spectrum.json"), &data.spectrum)?;
    write_results_csv(&dir.join("table.csv"), &data.table)?;
    log::info!("Wrote demo inputs to '{}'", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_cover_the_range_evenly() {
        let b = segment_bounds(5000.0, 5061.0, 20.0).unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(b[0].0, 5000.0);
        assert_eq!(b[2].1, 5061.0);
        assert!((b[0].1 - b[1].0).abs() < 1e-12);

        assert_eq!(segment_bounds(5000.0, 5005.0, 20.0).unwrap(), vec![(5000.0, 5005.0)]);
        assert!(segment_bounds(5000.0, 5005.0, 0.0).is_err());
    }

    #[test]
    fn best_params_uses_lowest_ok_row() {
        let mut t = ParameterTable::new(&["teff", "logg", "fe", "vsini", "rchisq"]).unwrap();
        t.push_row(0, vec![5000.0, 4.0, 0.0, 3.0, 0.5]).unwrap();
        t.push_row(1, vec![5500.0, 4.5, 0.1, 0.1, 1.5]).unwrap();
        t.push_row(2, vec![6000.0, 4.5, 0.2, 2.0, 3.0]).unwrap();
        t.rows_mut()[0].status = RowStatus::Failed("singular".into());
        t.rows_mut()[1].status = RowStatus::Ok;
        t.rows_mut()[2].status = RowStatus::Ok;

        let p = best_params(&t).unwrap().unwrap();
        assert_eq!(p.value("teff"), Some(5500.0));
        assert!(!p.get("teff").unwrap().vary);
        let v = p.get(VSINI).unwrap();
        assert!(v.vary);
        assert_eq!(v.value, VSINI_FLOOR);
    }

    #[test]
    fn no_ok_rows_means_no_start() {
        let mut t = ParameterTable::new(&["teff", "logg", "fe", "vsini", "rchisq"]).unwrap();
        t.push_row(0, vec![5000.0, 4.0, 0.0, 3.0, f64::NAN]).unwrap();
        assert_eq!(best_params(&t).unwrap(), None);
    }

    #[test]
    fn fully_excluded_segments_are_skipped() {
        let data = generate(&SyntheticConfig::default()).unwrap();
        let ex = ExclusionList::new(vec![(5140.0, 5181.0)]).unwrap();
        let matches = segment_matches(&data.spectrum, &data.library, &ex, 20.0).unwrap();
        assert_eq!(matches.len(), 2);
    }
}
