//! Linear least squares solver.
//!
//! Every Levenberg–Marquardt iteration solves a small damped linear problem
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! which we write as one stacked system `[J; √λ D] δ = [-r; 0]` and hand to
//! [`solve_least_squares`].
//!
//! Implementation choices:
//! - SVD handles tall systems (many wavelength samples, few free parameters)
//!   and degrades gracefully when columns are nearly collinear.
//! - Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices, so it is not used here.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped step `[J; √λ D] δ = [-r; 0]`.
///
/// `scale` holds the diagonal of `D`.
pub fn solve_damped_step(
    jac: &DMatrix<f64>,
    resid: &DVector<f64>,
    lambda: f64,
    scale: &[f64],
) -> Option<DVector<f64>> {
    let (m, n) = jac.shape();
    let mut a = DMatrix::<f64>::zeros(m + n, n);
    let mut b = DVector::<f64>::zeros(m + n);

    a.view_mut((0, 0), (m, n)).copy_from(jac);
    for i in 0..m {
        b[i] = -resid[i];
    }
    let sl = lambda.max(0.0).sqrt();
    for j in 0..n {
        a[(m + j, j)] = sl * scale[j];
    }

    solve_least_squares(&a, &b)
}
