//! Small order statistics and interpolation helpers.

/// Median of `values`, `None` when empty. Sorts in place; `NaN`s compare equal.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Median of a borrowed slice (copies once).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut buf = values.to_vec();
    median_mut(&mut buf)
}

/// Sum of squares.
pub fn sum_sq(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// Linear interpolation of `(xp, fp)` at `x`, flat beyond the ends.
///
/// `xp` must be strictly increasing and non-empty.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if n == 1 || x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let hi = xp.partition_point(|&v| v <= x);
    let lo = hi - 1;
    let t = (x - xp[lo]) / (xp[hi] - xp[lo]);
    fp[lo] + t * (fp[hi] - fp[lo])
}

/// [`interp`] over a whole grid.
pub fn interp_all(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&v| interp(v, xp, fp)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn interp_is_flat_outside_and_linear_inside() {
        let xp = [0.0, 10.0, 20.0];
        let fp = [1.0, 2.0, 0.0];
        assert_eq!(interp(-5.0, &xp, &fp), 1.0);
        assert_eq!(interp(25.0, &xp, &fp), 0.0);
        assert!((interp(5.0, &xp, &fp) - 1.5).abs() < 1e-12);
        assert!((interp(15.0, &xp, &fp) - 1.0).abs() < 1e-12);
        assert_eq!(interp(10.0, &xp, &fp), 2.0);
    }

    #[test]
    fn interp_single_point_is_constant() {
        assert_eq!(interp(123.0, &[5.0], &[0.7]), 0.7);
    }
}
