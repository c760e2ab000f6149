//! Bounded Levenberg–Marquardt least squares.
//!
//! Minimizes `Σ r(p)²` over the free parameters of a [`ParamSet`]. Bounds are
//! honoured through the internal-coordinate transforms of [`FreeSpace`], so
//! every residual evaluation sees feasible parameter values.
//!
//! Each iteration:
//! - forward-difference Jacobian in internal coordinates (one evaluation per
//!   free parameter),
//! - damped step `[J; √λ D] δ = [-r; 0]` solved by SVD,
//! - accept when the cost drops (λ /= 10), otherwise retry with λ *= 10.
//!
//! Convergence when the accepted step is small relative to the parameter
//! vector (`xtol`) or the relative cost reduction is below `ftol`.

use nalgebra::{DMatrix, DVector};

use crate::domain::ParamSet;
use crate::error::FitFailure;
use crate::fit::bounds::FreeSpace;
use crate::fit::exec::Deadline;
use crate::math::{solve_damped_step, sum_sq};

/// Default relative step tolerance.
pub const DEFAULT_XTOL: f64 = 1e-3;

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresOptions {
    /// Relative tolerance on the step size.
    pub xtol: f64,
    /// Relative tolerance on the cost reduction.
    pub ftol: f64,
    /// Evaluation budget; `None` means `200 * (n_free + 1)`.
    pub max_nfev: Option<usize>,
    /// Relative forward-difference step for the Jacobian.
    pub diff_step: f64,
}

impl Default for LeastSquaresOptions {
    fn default() -> Self {
        Self {
            xtol: DEFAULT_XTOL,
            ftol: 1.49012e-8,
            max_nfev: None,
            diff_step: 1.49012e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeastSquaresOutcome {
    /// Parameter set at the solution (fixed entries untouched).
    pub params: ParamSet,
    /// Residual vector at the solution.
    pub resid: Vec<f64>,
    /// `Σ resid²`.
    pub chisq: f64,
    pub nfev: usize,
    /// Accepted steps.
    pub niter: usize,
}

/// Run LM on `residual`, starting from `params`.
pub fn least_squares<F>(
    residual: F,
    params: &ParamSet,
    opts: &LeastSquaresOptions,
    deadline: Deadline,
) -> Result<LeastSquaresOutcome, FitFailure>
where
    F: Fn(&ParamSet) -> Result<Vec<f64>, FitFailure>,
{
    let space = FreeSpace::new(params);
    let n = space.dim();
    let max_nfev = opts.max_nfev.unwrap_or(200 * (n + 1));

    let mut u = space.start();
    let mut r = residual(&space.params_at(&u))?;
    let mut nfev = 1;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(FitFailure::NonFinite {
            context: "initial residual",
        });
    }
    let mut cost = sum_sq(&r);
    let mut niter = 0;

    let done = |u: &[f64], resid: Vec<f64>, cost: f64, nfev: usize, niter: usize| LeastSquaresOutcome {
        params: space.params_at(u),
        resid,
        chisq: cost,
        nfev,
        niter,
    };

    if n == 0 || r.is_empty() {
        return Ok(done(&u, r, cost, nfev, niter));
    }

    let m = r.len();
    let mut lambda = LAMBDA_START;
    let mut scale = vec![0.0_f64; n];

    loop {
        if deadline.expired() {
            return Err(FitFailure::DeadlineExceeded { nfev });
        }
        if nfev >= max_nfev {
            return Err(FitFailure::NotConverged { nfev });
        }

        // Forward-difference Jacobian.
        let mut jac = DMatrix::<f64>::zeros(m, n);
        for j in 0..n {
            let h = opts.diff_step * u[j].abs().max(1.0);
            let mut shifted = u.clone();
            shifted[j] += h;
            let rj = residual(&space.params_at(&shifted))?;
            nfev += 1;
            for i in 0..m {
                jac[(i, j)] = (rj[i] - r[i]) / h;
            }
        }
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(FitFailure::NonFinite { context: "jacobian" });
        }

        let r_vec = DVector::from_column_slice(&r);
        let gradient = jac.transpose() * &r_vec;
        if gradient.iter().all(|g| *g == 0.0) {
            log::debug!("lm: zero gradient after {nfev} evaluations");
            return Ok(done(&u, r, cost, nfev, niter));
        }

        // Marquardt scaling: running maximum of the column norms.
        for (j, s) in scale.iter_mut().enumerate() {
            let norm = jac.column(j).norm();
            *s = s.max(norm);
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        loop {
            if deadline.expired() {
                return Err(FitFailure::DeadlineExceeded { nfev });
            }
            if nfev >= max_nfev {
                return Err(FitFailure::NotConverged { nfev });
            }

            let step = solve_damped_step(&jac, &r_vec, lambda, &scale).ok_or(FitFailure::Singular)?;
            let trial: Vec<f64> = u.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
            let trial_r = residual(&space.params_at(&trial));
            nfev += 1;

            let accepted = match trial_r {
                Ok(tr) if tr.iter().all(|v| v.is_finite()) => {
                    let trial_cost = sum_sq(&tr);
                    if trial_cost < cost { Some((tr, trial_cost)) } else { None }
                }
                _ => None,
            };

            match accepted {
                Some((tr, trial_cost)) => {
                    let step_norm = step.iter().zip(&scale).map(|(d, s)| (d * s).powi(2)).sum::<f64>().sqrt();
                    let x_norm = u.iter().zip(&scale).map(|(x, s)| (x * s).powi(2)).sum::<f64>().sqrt();
                    let reduction = cost - trial_cost;

                    u = trial;
                    r = tr;
                    cost = trial_cost;
                    niter += 1;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);

                    if step_norm <= opts.xtol * (x_norm + opts.xtol) {
                        log::debug!("lm: xtol reached after {nfev} evaluations (chisq {cost:.4})");
                        return Ok(done(&u, r, cost, nfev, niter));
                    }
                    if reduction <= opts.ftol * cost {
                        log::debug!("lm: ftol reached after {nfev} evaluations (chisq {cost:.4})");
                        return Ok(done(&u, r, cost, nfev, niter));
                    }
                    break;
                }
                None => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        // No descent direction left at this point.
                        log::debug!("lm: stalled after {nfev} evaluations (chisq {cost:.4})");
                        return Ok(done(&u, r, cost, nfev, niter));
                    }
                }
            }
        }
    }
}
