//! Single-candidate fits for the grid search.
//!
//! A row of the parameter table fixes the library coordinates and the
//! continuum nodes; only `vsini` is optimized. The runner owns a template
//! [`ParamSet`] describing which table columns are parameters and how they
//! vary, and copies each row into a fresh clone of it.

use crate::domain::{ParamSet, ParameterTable, RESULT_COLUMNS, TableRow, GRID_PARAMS, VSINI, VSINI_FLOOR, VSINI_MAX};
use crate::error::{AppError, FitFailure};
use crate::fit::exec::FitLimits;
use crate::fit::lm::{LeastSquaresOptions, least_squares};
use crate::math::sum_sq;
use crate::models::SpectralMatch;

/// Outcome of one successful candidate fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRecord {
    pub chisq: f64,
    /// `chisq / (n_unmasked - n_varied)`, with the denominator floored at 1.
    pub rchisq: f64,
    /// `-0.5 * Σ masked_nresid²` at the final parameters.
    pub logprob: f64,
    pub nfev: usize,
    /// Final value of every varied parameter, in parameter order.
    pub varied: Vec<(String, f64)>,
}

impl FitRecord {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.varied.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Parameter template for grid-search fits over `table`.
///
/// Every non-result column becomes a fixed parameter; `vsini` is free within
/// [`VSINI_FLOOR`]..=[`VSINI_MAX`].
pub fn search_template(table: &ParameterTable) -> Result<ParamSet, AppError> {
    for name in GRID_PARAMS.iter().chain(std::iter::once(&VSINI)) {
        table.require_column(name)?;
    }

    let mut params = ParamSet::new();
    for column in table.columns() {
        if RESULT_COLUMNS.contains(&column.as_str()) {
            continue;
        }
        params.add(column, 0.0);
    }
    let vsini = params.add(VSINI, 0.0);
    vsini.vary = true;
    vsini.min = Some(VSINI_FLOOR);
    vsini.max = Some(VSINI_MAX);
    Ok(params)
}

pub struct FitRunner<'a, M: SpectralMatch + ?Sized> {
    matcher: &'a M,
    template: ParamSet,
    lsq: LeastSquaresOptions,
    limits: FitLimits,
}

impl<'a, M: SpectralMatch + ?Sized> FitRunner<'a, M> {
    pub fn new(matcher: &'a M, template: ParamSet, lsq: LeastSquaresOptions, limits: FitLimits) -> Self {
        Self {
            matcher,
            template,
            lsq,
            limits,
        }
    }

    pub fn template(&self) -> &ParamSet {
        &self.template
    }

    /// Parameters for `row`: the template with the row's values copied in.
    pub fn params_for(&self, columns: &[String], row: &TableRow) -> Result<ParamSet, FitFailure> {
        let mut params = self.template.clone();
        for (name, value) in columns.iter().zip(&row.values) {
            if !params.contains(name) {
                continue;
            }
            if !value.is_finite() {
                return Err(FitFailure::NonFinite { context: "row values" });
            }
            let p = params.add(name, *value);
            p.value = p.clamp(p.value);
        }
        Ok(params)
    }

    /// Fit one table row.
    pub fn fit_row(&self, columns: &[String], row: &TableRow) -> Result<FitRecord, FitFailure> {
        let start = self.params_for(columns, row)?;
        self.fit(&start)
    }

    /// Fit from a prepared parameter set.
    pub fn fit(&self, start: &ParamSet) -> Result<FitRecord, FitFailure> {
        let outcome = least_squares(|p| self.matcher.nresid(p), start, &self.lsq, self.limits.start())?;

        let n_varied = outcome.params.n_varying();
        let dof = self.matcher.n_unmasked().saturating_sub(n_varied).max(1);
        let logprob = -0.5 * sum_sq(&self.matcher.masked_nresid(&outcome.params)?);

        Ok(FitRecord {
            chisq: outcome.chisq,
            rchisq: outcome.chisq / dof as f64,
            logprob,
            nfev: outcome.nfev,
            varied: outcome.params.varying().map(|p| (p.name.clone(), p.value)).collect(),
        })
    }
}
