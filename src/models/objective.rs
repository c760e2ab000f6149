//! Scalar objectives minimized by the polishing pass.
//!
//! The set is closed: callers pick a variant, never a method name.

use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::ParamSet;
use crate::error::{AppError, FitFailure};
use crate::math::{median_mut, sum_sq};
use crate::models::matcher::SpectralMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Σ over unmasked samples of `((flux - model) / uflux)²`.
    Chi2,
    /// Like `Chi2`, but residuals are centred on their median first, so a
    /// global flux offset does not count against the fit.
    #[value(name = "chi2med")]
    Chi2Med,
}

impl Objective {
    pub fn name(self) -> &'static str {
        match self {
            Objective::Chi2 => "chi2",
            Objective::Chi2Med => "chi2med",
        }
    }

    /// Evaluate the objective for `params` against `m`.
    pub fn compute<M: SpectralMatch + ?Sized>(self, m: &M, params: &ParamSet) -> Result<f64, FitFailure> {
        let value = match self {
            Objective::Chi2 => sum_sq(&m.masked_nresid(params)?),
            Objective::Chi2Med => {
                let spec = m.spectrum();
                let resid = m.resid(params)?;
                let mut kept: Vec<(f64, f64)> = resid
                    .iter()
                    .zip(&spec.uflux)
                    .zip(m.mask())
                    .filter(|(_, masked)| !**masked)
                    .map(|((r, u), _)| (*r, *u))
                    .collect();
                let mut centre: Vec<f64> = kept.iter().map(|k| k.0).collect();
                let med = median_mut(&mut centre).unwrap_or(0.0);
                for k in &mut kept {
                    k.0 = (k.0 - med) / k.1;
                }
                kept.iter().map(|k| k.0 * k.0).sum()
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(FitFailure::NonFinite { context: "objective" })
        }
    }
}

impl FromStr for Objective {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chi2" => Ok(Objective::Chi2),
            "chi2med" | "chi2-med" => Ok(Objective::Chi2Med),
            other => Err(AppError::config(format!(
                "Unknown objective '{other}' (expected chi2 or chi2med)."
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_and_unknown_names() {
        assert_eq!("chi2med".parse::<Objective>().unwrap(), Objective::Chi2Med);
        assert_eq!(" CHI2 ".parse::<Objective>().unwrap(), Objective::Chi2);
        let err = "chi3".parse::<Objective>().unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
