//! Library model grid resampled onto an observed wavelength grid.
//!
//! Synthesis at an arbitrary `(teff, logg, fe)`:
//!
//! - locate the bracketing grid values on each axis,
//! - if all corners of the bracketing cell exist, blend them trilinearly,
//! - otherwise (ragged grid, hole in the cell) fall back to the nearest model
//!   in axis-span-scaled distance.
//!
//! Coordinates outside the grid are clamped to its edge.

use std::collections::HashMap;

use crate::domain::LibrarySubset;
use crate::error::AppError;
use crate::math::interp_all;

#[derive(Debug, Clone)]
pub struct ModelGrid {
    /// Sorted distinct grid values per axis (teff, logg, fe).
    axes: [Vec<f64>; 3],
    /// Axis indices of each model.
    coords: Vec<[usize; 3]>,
    /// Flux of each model on the observed grid.
    flux: Vec<Vec<f64>>,
    by_coord: HashMap<[usize; 3], usize>,
}

/// Bracket of one axis: lower index, upper index, weight of the upper index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bracket {
    lo: usize,
    hi: usize,
    t: f64,
}

impl ModelGrid {
    /// Resample every library model onto `wav`.
    pub fn new(lib: &LibrarySubset, wav: &[f64]) -> Result<Self, AppError> {
        lib.validate()?;

        let mut axes: [Vec<f64>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for m in &lib.models {
            for (axis, v) in axes.iter_mut().zip([m.teff, m.logg, m.fe]) {
                if !v.is_finite() {
                    return Err(AppError::resource("Library model has non-finite grid coordinates."));
                }
                axis.push(v);
            }
        }
        for axis in &mut axes {
            axis.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            axis.dedup();
        }

        let mut coords = Vec::with_capacity(lib.models.len());
        let mut flux = Vec::with_capacity(lib.models.len());
        let mut by_coord = HashMap::new();
        for (i, m) in lib.models.iter().enumerate() {
            let c = [
                axis_position(&axes[0], m.teff),
                axis_position(&axes[1], m.logg),
                axis_position(&axes[2], m.fe),
            ];
            if by_coord.insert(c, i).is_some() {
                return Err(AppError::resource(format!(
                    "Library has duplicate models at teff={}, logg={}, fe={}.",
                    m.teff, m.logg, m.fe
                )));
            }
            coords.push(c);
            flux.push(interp_all(wav, &lib.wav, &m.flux));
        }

        Ok(Self {
            axes,
            coords,
            flux,
            by_coord,
        })
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }

    /// Model flux at `(teff, logg, fe)` on the observed grid.
    pub fn synthesize(&self, teff: f64, logg: f64, fe: f64) -> Vec<f64> {
        let point = [teff, logg, fe];
        let brackets = [
            bracket(&self.axes[0], teff),
            bracket(&self.axes[1], logg),
            bracket(&self.axes[2], fe),
        ];

        match self.trilinear(&brackets) {
            Some(flux) => flux,
            None => self.flux[self.nearest(&point)].clone(),
        }
    }

    fn trilinear(&self, b: &[Bracket; 3]) -> Option<Vec<f64>> {
        let n = self.flux[0].len();
        let mut out = vec![0.0; n];
        for corner in 0..8usize {
            let mut idx = [0usize; 3];
            let mut weight = 1.0;
            for axis in 0..3 {
                let upper = (corner >> axis) & 1 == 1;
                let br = b[axis];
                if br.lo == br.hi && upper {
                    weight = 0.0;
                    break;
                }
                idx[axis] = if upper { br.hi } else { br.lo };
                weight *= if upper { br.t } else { 1.0 - br.t };
            }
            if weight == 0.0 {
                continue;
            }
            let model = *self.by_coord.get(&idx)?;
            for (o, f) in out.iter_mut().zip(&self.flux[model]) {
                *o += weight * f;
            }
        }
        Some(out)
    }

    fn nearest(&self, point: &[f64; 3]) -> usize {
        let spans: Vec<f64> = self
            .axes
            .iter()
            .map(|a| {
                let span = a[a.len() - 1] - a[0];
                if span > 0.0 { span } else { 1.0 }
            })
            .collect();

        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (i, c) in self.coords.iter().enumerate() {
            let d: f64 = (0..3)
                .map(|axis| {
                    let dv = (self.axes[axis][c[axis]] - point[axis]) / spans[axis];
                    dv * dv
                })
                .sum();
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }
}

fn axis_position(axis: &[f64], v: f64) -> usize {
    axis.partition_point(|&a| a < v)
}

fn bracket(axis: &[f64], v: f64) -> Bracket {
    let n = axis.len();
    if n == 1 || v <= axis[0] {
        return Bracket { lo: 0, hi: 0, t: 0.0 };
    }
    if v >= axis[n - 1] {
        return Bracket {
            lo: n - 1,
            hi: n - 1,
            t: 0.0,
        };
    }
    let hi = axis.partition_point(|&a| a <= v);
    let lo = hi - 1;
    if axis[lo] == v {
        return Bracket { lo, hi: lo, t: 0.0 };
    }
    Bracket {
        lo,
        hi,
        t: (v - axis[lo]) / (axis[hi] - axis[lo]),
    }
}
