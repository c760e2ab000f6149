//! Two-phase grid search.
//!
//! 1. Fit every coarse row (only `vsini` free).
//! 2. Rank coarse results by `rchisq` and take the best `top_k`.
//! 3. Fine candidates: requested fine rows that were not already coarse rows,
//!    restricted to the closed `teff`/`logg`/`fe` bounding box of the best
//!    coarse rows.
//! 4. Fit the fine rows and append them after the coarse rows.
//!
//! Failed fits stay in the result table with `NaN` result columns and a
//! failed status, so the output always has one row per evaluated candidate.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::{
    ExclusionList, GRID_PARAMS, ParameterTable, RESULT_COLUMNS, RowStatus, Spectrum, VSINI,
};
use crate::error::{AppError, FitFailure};
use crate::fit::exec::{CancelToken, Execution, FitLimits, map_ordered};
use crate::fit::lm::LeastSquaresOptions;
use crate::fit::mask::wavmask;
use crate::fit::runner::{FitRecord, FitRunner, search_template};
use crate::io::LibrarySource;
use crate::models::{ContinuumMethod, DEFAULT_NODE_SPACING, SpectralMatch, SpectrumMatch, node_name, spline_nodes};
use crate::report::{grid_header, grid_row};

/// Number of coarse rows that define the fine-search bounding box.
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Continuum node spacing (Å) over the full spectrum.
    pub node_spacing: f64,
    pub continuum: ContinuumMethod,
    pub lsq: LeastSquaresOptions,
    pub execution: Execution,
    pub limits: FitLimits,
    pub cancel: CancelToken,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            node_spacing: DEFAULT_NODE_SPACING,
            continuum: ContinuumMethod::SplineDd,
            lsq: LeastSquaresOptions::default(),
            execution: Execution::Serial,
            limits: FitLimits::default(),
            cancel: CancelToken::new(),
        }
    }
}

/// Full grid search: load the library, bind the match and run both phases.
#[allow(clippy::too_many_arguments)]
pub fn grid_search<S: LibrarySource + ?Sized>(
    spectrum: Spectrum,
    source: &S,
    library_path: &Path,
    exclusions: &ExclusionList,
    table: &ParameterTable,
    coarse: &[usize],
    fine: &[usize],
    options: &SearchOptions,
) -> Result<ParameterTable, AppError> {
    spectrum.validate()?;
    check_inputs(table, coarse, fine, options)?;

    let (wav_min, wav_max) = (spectrum.wav_min(), spectrum.wav_max());
    let lib = source.load(library_path, (wav_min, wav_max))?;
    log::info!(
        "Loaded {} library models over {wav_min:.1}-{wav_max:.1} A",
        lib.models.len()
    );

    let mask = wavmask(&spectrum.wav, exclusions);
    let m = SpectrumMatch::new(spectrum, &lib, mask, options.continuum)?;

    let mut table = table.clone();
    if options.continuum == ContinuumMethod::SplineDd {
        for node in spline_nodes(wav_min, wav_max, options.node_spacing) {
            let name = node_name(node);
            table.ensure_column(&name, 1.0);
            table.fill_column(&name, 1.0);
        }
    }

    grid_search_with_match(&m, &table, coarse, fine, options)
}

/// Grid search against an already bound match.
pub fn grid_search_with_match<M: SpectralMatch + ?Sized>(
    m: &M,
    table: &ParameterTable,
    coarse: &[usize],
    fine: &[usize],
    options: &SearchOptions,
) -> Result<ParameterTable, AppError> {
    check_inputs(table, coarse, fine, options)?;

    let template = search_template(table)?;
    let runner = FitRunner::new(m, template, options.lsq, options.limits);

    let coarse_rows = table.select(coarse)?;
    log::info!("Coarse search: {} rows", coarse_rows.len());
    let coarse_res = run_phase(&runner, coarse_rows, options)?;

    let fine_rows = fine_candidates(table, &coarse_res, fine, options.top_k)?;
    log::info!("Fine search: {} rows", fine_rows.len());
    let fine_res = run_phase(&runner, fine_rows, options)?;

    coarse_res.concat(fine_res)
}

fn check_inputs(table: &ParameterTable, coarse: &[usize], fine: &[usize], options: &SearchOptions) -> Result<(), AppError> {
    table.validate()?;
    if table.is_empty() {
        return Err(AppError::config("Parameter table is empty."));
    }
    if coarse.is_empty() {
        return Err(AppError::config("No coarse rows requested."));
    }
    if options.top_k == 0 {
        return Err(AppError::config("top_k must be at least 1."));
    }
    if !(options.node_spacing.is_finite() && options.node_spacing > 0.0) {
        return Err(AppError::config("Node spacing must be positive."));
    }
    for name in GRID_PARAMS.iter().chain(std::iter::once(&VSINI)) {
        table.require_column(name)?;
    }
    for &index in coarse.iter().chain(fine) {
        if table.position_of(index).is_none() {
            return Err(AppError::config(format!("Row index {index} is not in the parameter table.")));
        }
    }
    Ok(())
}

/// Requested fine rows that were not coarse rows and fall inside the
/// bounding box of the best coarse results.
fn fine_candidates(
    table: &ParameterTable,
    coarse_res: &ParameterTable,
    fine: &[usize],
    top_k: usize,
) -> Result<ParameterTable, AppError> {
    let ranked = coarse_res
        .filter(|r| r.status == RowStatus::Ok)
        .sorted_by("rchisq")?
        .head(top_k);

    let mut bounds = Vec::with_capacity(GRID_PARAMS.len());
    for name in GRID_PARAMS {
        match ranked.column_range(name)? {
            Some((lo, hi)) => bounds.push((table.require_column(name)?, lo, hi)),
            None => {
                log::warn!("No successful coarse fits; skipping the fine search.");
                return Ok(table.filter(|_| false));
            }
        }
    }
    log::debug!("Fine bounding box: {bounds:?}");

    let coarse_keys: HashSet<usize> = coarse_res.indices().into_iter().collect();
    let fine_keys: Vec<usize> = fine.iter().copied().filter(|i| !coarse_keys.contains(i)).collect();

    Ok(table
        .select(&fine_keys)?
        .filter(|row| bounds.iter().all(|&(col, lo, hi)| (lo..=hi).contains(&row.values[col]))))
}

/// Fit every row of `rows` and return them with result columns filled in.
fn run_phase<M: SpectralMatch + ?Sized>(
    runner: &FitRunner<'_, M>,
    rows: ParameterTable,
    options: &SearchOptions,
) -> Result<ParameterTable, AppError> {
    let mut out = rows;
    for name in RESULT_COLUMNS {
        out.ensure_column(name, f64::NAN);
    }
    let varied = runner.template().var_names();
    for name in &varied {
        out.ensure_column(name, f64::NAN);
    }
    if out.is_empty() {
        return Ok(out);
    }

    let columns = out.columns().to_vec();
    let col = |name: &str| out.require_column(name);
    let (i_teff, i_logg, i_fe) = (col("teff")?, col("logg")?, col("fe")?);
    let total = out.len();

    log::info!("{}", grid_header());
    let outcomes = map_ordered(out.rows(), options.execution, &options.cancel, |i, row| {
        let result = runner.fit_row(&columns, row);
        let (vsini, rchisq, nfev) = progress_fields(&result);
        log::info!(
            "{}",
            grid_row(i + 1, total, row.values[i_teff], row.values[i_logg], row.values[i_fe], vsini, rchisq, nfev)
        );
        result
    });

    let result_cols: Vec<usize> = RESULT_COLUMNS
        .iter()
        .map(|name| out.require_column(name))
        .collect::<Result<_, _>>()?;
    let varied_cols: Vec<(String, usize)> = varied
        .iter()
        .map(|name| out.require_column(name).map(|c| (name.clone(), c)))
        .collect::<Result<_, _>>()?;

    for (row, outcome) in out.rows_mut().iter_mut().zip(outcomes) {
        match outcome {
            Ok(rec) => {
                let values = [rec.chisq, rec.rchisq, rec.logprob, rec.nfev as f64];
                for (&c, v) in result_cols.iter().zip(values) {
                    row.values[c] = v;
                }
                for (name, c) in &varied_cols {
                    if let Some(v) = rec.value(name) {
                        row.values[*c] = v;
                    }
                }
                row.status = RowStatus::Ok;
            }
            Err(failure) => {
                log::warn!("Row {} failed: {failure}", row.index);
                for &c in &result_cols {
                    row.values[c] = f64::NAN;
                }
                row.status = RowStatus::Failed(failure.tag().to_string());
            }
        }
    }

    Ok(out)
}

/// `(vsini, rchisq, nfev)` for the progress line; all `NaN` for a failed fit.
fn progress_fields(result: &Result<FitRecord, FitFailure>) -> (f64, f64, f64) {
    match result {
        Ok(rec) => (rec.value(VSINI).unwrap_or(f64::NAN), rec.rchisq, rec.nfev as f64),
        Err(_) => (f64::NAN, f64::NAN, f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParamSet, Spectrum};
    use crate::math::sum_sq;

    /// Flat model whose offset from the data is a smooth function of the
    /// grid coordinates. Best rows have `logg = 4.5`.
    struct Bowl {
        spec: Spectrum,
        mask: Vec<bool>,
    }

    impl Bowl {
        fn new() -> Self {
            let n = 30;
            let wav = (0..n).map(|i| 5000.0 + i as f64).collect();
            let mut mask = vec![false; n];
            mask[7] = true;
            Self {
                spec: Spectrum::new(wav, vec![1.0; n], vec![0.1; n]).unwrap(),
                mask,
            }
        }
    }

    impl SpectralMatch for Bowl {
        fn spectrum(&self) -> &Spectrum {
            &self.spec
        }

        fn mask(&self) -> &[bool] {
            &self.mask
        }

        fn model(&self, p: &ParamSet) -> Result<Vec<f64>, FitFailure> {
            let get = |n: &str| p.require(n).map_err(FitFailure::Model);
            let (teff, logg, vsini) = (get("teff")?, get("logg")?, get("vsini")?);
            if teff > 9000.0 {
                return Ok(vec![f64::NAN; self.spec.len()]);
            }
            let level = 1.0
                + 0.5 * (logg - 4.5).powi(2)
                + 0.001 * ((teff - 5200.0) / 100.0).powi(2)
                + 0.01 * (vsini - 5.0).powi(2);
            Ok(vec![level; self.spec.len()])
        }

        fn continuum(&self, _p: &ParamSet, wav: &[f64]) -> Result<Vec<f64>, FitFailure> {
            Ok(vec![1.0; wav.len()])
        }
    }

    /// 20 coarse rows (10 distinct triples, each twice) plus fine rows.
    fn table() -> ParameterTable {
        let mut t = ParameterTable::new(&["teff", "logg", "fe", "vsini"]).unwrap();
        let mut index = 0;
        for _ in 0..2 {
            for teff in [5000.0, 5100.0, 5200.0, 5300.0, 5400.0] {
                for logg in [4.5, 3.0] {
                    t.push_row(index, vec![teff, logg, 0.0, 2.0]).unwrap();
                    index += 1;
                }
            }
        }
        // Fine rows: 20 outside (teff), 21 inside, 22 outside (logg), 23 inside.
        t.push_row(20, vec![5450.0, 4.5, 0.0, 2.0]).unwrap();
        t.push_row(21, vec![5350.0, 4.5, 0.0, 2.0]).unwrap();
        t.push_row(22, vec![5350.0, 4.0, 0.0, 2.0]).unwrap();
        t.push_row(23, vec![5050.0, 4.5, 0.0, 2.0]).unwrap();
        t
    }

    fn options() -> SearchOptions {
        SearchOptions::default()
    }

    #[test]
    fn fine_rows_respect_bounding_box() {
        let m = Bowl::new();
        let coarse: Vec<usize> = (0..20).collect();
        let fine: Vec<usize> = (0..24).collect();
        let res = grid_search_with_match(&m, &table(), &coarse, &fine, &options()).unwrap();

        let indices = res.indices();
        let mut expected: Vec<usize> = (0..20).collect();
        expected.extend([21, 23]);
        assert_eq!(indices, expected);
        assert!(res.rows().iter().all(|r| r.status == RowStatus::Ok));
    }

    #[test]
    fn coarse_and_fine_are_disjoint() {
        let m = Bowl::new();
        let coarse: Vec<usize> = (0..20).collect();
        let fine = vec![21, 0, 1, 23, 21];
        let res = grid_search_with_match(&m, &table(), &coarse, &fine, &options()).unwrap();
        let keys = res.indices();
        let unique: HashSet<usize> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
        assert_eq!(&keys[20..], &[21, 23]);
    }

    #[test]
    fn results_carry_fitted_vsini_and_logprob() {
        let m = Bowl::new();
        let res = grid_search_with_match(&m, &table(), &[0, 1], &[], &options()).unwrap();
        let vsini = res.get(0, "vsini").unwrap();
        assert!((vsini - 5.0).abs() < 0.1);

        let mut p = ParamSet::new();
        for name in ["teff", "logg", "fe", "vsini"] {
            p.add(name, res.get(0, name).unwrap());
        }
        let expected = -0.5 * sum_sq(&m.masked_nresid(&p).unwrap());
        assert!((res.get(0, "logprob").unwrap() - expected).abs() < 1e-9);
        assert!(res.get(0, "nfev").unwrap() >= 1.0);
        assert!(res.get(1, "rchisq").unwrap() > res.get(0, "rchisq").unwrap());
    }

    #[test]
    fn failed_rows_are_kept_with_nan_results() {
        let m = Bowl::new();
        let mut t = table();
        t.push_row(99, vec![9500.0, 4.5, 0.0, 2.0]).unwrap();
        let res = grid_search_with_match(&m, &t, &[0, 99], &[], &options()).unwrap();
        assert_eq!(res.indices(), vec![0, 99]);
        assert!(res.get(99, "rchisq").unwrap().is_nan());
        assert_eq!(res.rows()[1].status, RowStatus::Failed("non-finite".into()));
        assert_eq!(res.rows()[0].status, RowStatus::Ok);
    }

    #[test]
    fn progress_line_covers_failed_rows() {
        let rec = FitRecord {
            chisq: 4.0,
            rchisq: 2.0,
            logprob: -2.0,
            nfev: 7,
            varied: vec![(VSINI.to_string(), 3.5)],
        };
        assert_eq!(progress_fields(&Ok(rec)), (3.5, 2.0, 7.0));

        let (vsini, rchisq, nfev) = progress_fields(&Err(FitFailure::Model("no coverage".into())));
        assert!(vsini.is_nan() && rchisq.is_nan() && nfev.is_nan());
    }

    #[test]
    fn parallel_matches_serial() {
        let m = Bowl::new();
        let coarse: Vec<usize> = (0..20).collect();
        let fine: Vec<usize> = (20..24).collect();
        let serial = grid_search_with_match(&m, &table(), &coarse, &fine, &options()).unwrap();
        let parallel_opts = SearchOptions {
            execution: Execution::Parallel,
            ..options()
        };
        let parallel = grid_search_with_match(&m, &table(), &coarse, &fine, &parallel_opts).unwrap();
        assert_eq!(serial.indices(), parallel.indices());
        for (a, b) in serial.rows().iter().zip(parallel.rows()) {
            for (x, y) in a.values.iter().zip(&b.values) {
                assert!(x == y || (x.is_nan() && y.is_nan()));
            }
        }
    }

    #[test]
    fn cancelled_search_marks_every_row() {
        let m = Bowl::new();
        let opts = options();
        opts.cancel.cancel();
        let res = grid_search_with_match(&m, &table(), &[0, 1, 2], &[], &opts).unwrap();
        assert_eq!(res.len(), 3);
        assert!(res.rows().iter().all(|r| r.status == RowStatus::Failed("cancelled".into())));
    }

    #[test]
    fn configuration_errors_fail_fast() {
        let m = Bowl::new();
        let t = table();
        let empty = ParameterTable::new(&["teff", "logg", "fe", "vsini"]).unwrap();
        let zero_k = SearchOptions {
            top_k: 0,
            ..options()
        };

        for err in [
            grid_search_with_match(&m, &empty, &[0], &[], &options()).unwrap_err(),
            grid_search_with_match(&m, &t, &[], &[], &options()).unwrap_err(),
            grid_search_with_match(&m, &t, &[0, 500], &[], &options()).unwrap_err(),
            grid_search_with_match(&m, &t, &[0], &[], &zero_k).unwrap_err(),
        ] {
            assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        }
    }
}
