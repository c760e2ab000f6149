//! Nelder–Mead simplex minimization on top of `argmin`.
//!
//! The objective is wrapped as an `argmin` [`CostFunction`] over the bounded
//! internal coordinates of [`FreeSpace`]. Non-finite or failing evaluations
//! count as `+∞`, so the simplex simply moves away from them. The per-fit
//! deadline is checked before every evaluation.
//!
//! Termination: converged when the standard deviation of the vertex values
//! drops below `sd_tolerance`; otherwise the iteration budget runs out and
//! the best vertex is returned with `converged = false`.

use std::sync::atomic::{AtomicUsize, Ordering};

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

use crate::domain::ParamSet;
use crate::error::FitFailure;
use crate::fit::bounds::FreeSpace;
use crate::fit::exec::Deadline;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexOptions {
    /// Convergence threshold on the spread of the vertex values.
    pub sd_tolerance: f64,
    /// Iteration budget; `None` means `200 * n_free`.
    pub max_iters: Option<u64>,
    /// Relative size of the initial simplex edge.
    pub initial_step: f64,
    /// Edge used for coordinates that start at zero.
    pub zero_step: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            sd_tolerance: 1e-4,
            max_iters: None,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplexOutcome {
    pub params: ParamSet,
    pub value: f64,
    pub nfev: usize,
    pub niter: usize,
    /// `false` when the iteration budget ran out first.
    pub converged: bool,
}

/// Exposes a parameter-set objective as an `argmin` problem.
struct SimplexProblem<'a, F> {
    objective: &'a F,
    space: &'a FreeSpace,
    deadline: Deadline,
    nfev: &'a AtomicUsize,
}

impl<F> CostFunction for SimplexProblem<'_, F>
where
    F: Fn(&ParamSet) -> Result<f64, FitFailure>,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> Result<Self::Output, Error> {
        if self.deadline.expired() {
            let nfev = self.nfev.load(Ordering::Relaxed);
            return Err(FitFailure::DeadlineExceeded { nfev }.into());
        }
        self.nfev.fetch_add(1, Ordering::Relaxed);
        Ok(match (self.objective)(&self.space.params_at(u)) {
            Ok(v) if v.is_finite() => v,
            _ => f64::INFINITY,
        })
    }
}

/// Minimize `objective` over the free parameters of `params`.
///
/// Errors only when the starting point cannot be evaluated or the deadline
/// passes; running out of iterations yields `converged = false`.
pub fn minimize<F>(
    objective: F,
    params: &ParamSet,
    opts: &SimplexOptions,
    deadline: Deadline,
) -> Result<SimplexOutcome, FitFailure>
where
    F: Fn(&ParamSet) -> Result<f64, FitFailure>,
{
    let space = FreeSpace::new(params);
    let n = space.dim();

    let x0 = space.start();
    let f0 = objective(&space.params_at(&x0))?;
    if !f0.is_finite() {
        return Err(FitFailure::NonFinite {
            context: "initial objective",
        });
    }

    if n == 0 {
        return Ok(SimplexOutcome {
            params: space.params_at(&x0),
            value: f0,
            nfev: 1,
            niter: 0,
            converged: true,
        });
    }

    let nfev = AtomicUsize::new(1);
    let problem = SimplexProblem {
        objective: &objective,
        space: &space,
        deadline,
        nfev: &nfev,
    };
    let solver = NelderMead::new(initial_simplex(&x0, opts))
        .with_sd_tolerance(opts.sd_tolerance)
        .map_err(|e| FitFailure::Model(format!("simplex setup: {e}")))?;
    let max_iters = opts.max_iters.unwrap_or(200 * n as u64);

    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .map_err(|e| e.downcast::<FitFailure>().unwrap_or_else(|e| FitFailure::Model(e.to_string())))?;

    let state = result.state();
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    let (best, value) = match state.get_best_param() {
        Some(u) if state.get_best_cost() <= f0 => (u.clone(), state.get_best_cost()),
        _ => (x0, f0),
    };
    let nfev = nfev.load(Ordering::Relaxed);

    log::debug!(
        "simplex: {} after {nfev} evaluations, value {value:.6}",
        if converged { "converged" } else { "budget exhausted" },
    );

    Ok(SimplexOutcome {
        params: space.params_at(&best),
        value,
        nfev,
        niter: state.get_iter() as usize,
        converged,
    })
}

/// `x0` plus one vertex per coordinate, stepped by `initial_step` (relative)
/// or `zero_step` where the coordinate is zero.
fn initial_simplex(x0: &[f64], opts: &SimplexOptions) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(x0.len() + 1);
    vertices.push(x0.to_vec());
    for k in 0..x0.len() {
        let mut y = x0.to_vec();
        y[k] = if y[k] != 0.0 {
            (1.0 + opts.initial_step) * y[k]
        } else {
            opts.zero_step
        };
        vertices.push(y);
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::fit::exec::FitLimits;

    fn bowl(p: &ParamSet) -> Result<f64, FitFailure> {
        let x = p.value("x").unwrap_or(0.0);
        let y = p.value("y").unwrap_or(0.0);
        Ok((x - 1.0).powi(2) + 10.0 * (y + 2.0).powi(2))
    }

    fn start() -> ParamSet {
        let mut p = ParamSet::new();
        p.add("x", 3.0).vary = true;
        p.add("y", 1.0).vary = true;
        p
    }

    #[test]
    fn finds_quadratic_minimum() {
        let opts = SimplexOptions {
            sd_tolerance: 1e-12,
            max_iters: Some(2000),
            ..SimplexOptions::default()
        };
        let out = minimize(bowl, &start(), &opts, Deadline::none()).unwrap();
        assert!(out.converged);
        assert!((out.params.value("x").unwrap() - 1.0).abs() < 1e-3);
        assert!((out.params.value("y").unwrap() + 2.0).abs() < 1e-3);
        assert!(out.value < 1e-6);
        assert!(out.nfev > out.niter);
    }

    #[test]
    fn initial_simplex_steps_each_coordinate() {
        let v = initial_simplex(&[2.0, 0.0], &SimplexOptions::default());
        assert_eq!(v, vec![vec![2.0, 0.0], vec![2.1, 0.0], vec![2.0, 0.00025]]);
    }

    #[test]
    fn stays_inside_bounds() {
        let mut p = start();
        p.get_mut("x").unwrap().min = Some(2.0);
        let opts = SimplexOptions {
            sd_tolerance: 1e-10,
            ..SimplexOptions::default()
        };
        let out = minimize(bowl, &p, &opts, Deadline::none()).unwrap();
        let x = out.params.value("x").unwrap();
        assert!(x >= 2.0);
        assert!(x - 2.0 < 1e-2);
    }

    #[test]
    fn non_finite_regions_are_avoided() {
        let f = |p: &ParamSet| {
            let x = p.value("x").unwrap_or(0.0);
            if x > 3.5 { Ok(f64::NAN) } else { Ok((x - 1.0).powi(2)) }
        };
        let mut p = ParamSet::new();
        p.add("x", 3.0).vary = true;
        let opts = SimplexOptions {
            sd_tolerance: 1e-10,
            ..SimplexOptions::default()
        };
        let out = minimize(f, &p, &opts, Deadline::none()).unwrap();
        assert!((out.params.value("x").unwrap() - 1.0).abs() < 1e-2);
    }

    #[test]
    fn budget_exhaustion_is_not_an_error() {
        let opts = SimplexOptions {
            max_iters: Some(1),
            ..SimplexOptions::default()
        };
        let out = minimize(bowl, &start(), &opts, Deadline::none()).unwrap();
        assert!(!out.converged);
        assert!(out.value <= bowl(&start()).unwrap());
    }

    #[test]
    fn deadline_is_reported() {
        let limits = FitLimits {
            deadline: Some(Duration::ZERO),
        };
        let err = minimize(bowl, &start(), &SimplexOptions::default(), limits.start()).unwrap_err();
        assert!(matches!(err, FitFailure::DeadlineExceeded { .. }));
    }

    #[test]
    fn fixed_parameters_need_no_search() {
        let mut p = ParamSet::new();
        p.add("x", 3.0);
        let out = minimize(bowl, &p, &SimplexOptions::default(), Deadline::none()).unwrap();
        assert!(out.converged);
        assert_eq!(out.nfev, 1);
        assert_eq!(out.params, p);
    }
}
