//! Bound handling for the optimizers.
//!
//! Both optimizers work on unconstrained internal coordinates. Bounded
//! parameters are mapped with the MINUIT transforms:
//!
//! - `[min, max]`: `x = min + (sin u + 1)(max - min) / 2`
//! - `[min, ∞)`:   `x = min - 1 + √(u² + 1)`
//! - `(-∞, max]`:  `x = max + 1 - √(u² + 1)`
//!
//! so every internal point maps to a feasible external value.

use crate::domain::{Param, ParamSet};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bound {
    fn of(p: &Param) -> Self {
        match (p.min, p.max) {
            (Some(lo), Some(hi)) => Bound::Both(lo, hi),
            (Some(lo), None) => Bound::Lower(lo),
            (None, Some(hi)) => Bound::Upper(hi),
            (None, None) => Bound::Free,
        }
    }

    fn to_internal(self, x: f64) -> f64 {
        match self {
            Bound::Free => x,
            Bound::Lower(lo) => {
                let a = x.max(lo) - lo + 1.0;
                (a * a - 1.0).sqrt()
            }
            Bound::Upper(hi) => {
                let a = hi - x.min(hi) + 1.0;
                (a * a - 1.0).sqrt()
            }
            Bound::Both(lo, hi) => {
                if hi <= lo {
                    return 0.0;
                }
                let s = (2.0 * (x.clamp(lo, hi) - lo) / (hi - lo) - 1.0).clamp(-1.0, 1.0);
                s.asin()
            }
        }
    }

    fn to_external(self, u: f64) -> f64 {
        match self {
            Bound::Free => u,
            Bound::Lower(lo) => lo - 1.0 + (u * u + 1.0).sqrt(),
            Bound::Upper(hi) => hi + 1.0 - (u * u + 1.0).sqrt(),
            Bound::Both(lo, hi) => lo + (u.sin() + 1.0) * (hi - lo) / 2.0,
        }
    }
}

/// Maps between a parameter set's free values and internal coordinates.
#[derive(Debug, Clone)]
pub struct FreeSpace {
    template: ParamSet,
    bounds: Vec<Bound>,
}

impl FreeSpace {
    pub fn new(params: &ParamSet) -> Self {
        Self {
            template: params.clone(),
            bounds: params.varying().map(Bound::of).collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.bounds.len()
    }

    /// Internal coordinates of the template's starting point.
    pub fn start(&self) -> Vec<f64> {
        self.template
            .varying()
            .zip(&self.bounds)
            .map(|(p, b)| b.to_internal(p.value))
            .collect()
    }

    /// A copy of the template with free values taken from `u`.
    pub fn params_at(&self, u: &[f64]) -> ParamSet {
        let mut params = self.template.clone();
        let external: Vec<f64> = u
            .iter()
            .zip(&self.bounds)
            .map(|(ui, b)| b.to_external(*ui))
            .collect();
        params.set_free_values(&external);
        params
    }
}
