//! Matching an observed spectrum against library models.
//!
//! [`SpectralMatch`] is the contract the search and polishing engines drive:
//! implementors supply the observed spectrum, its exclusion mask and a model
//! spectrum for a parameter set; the residual flavours and objectives are
//! derived from those. [`SpectrumMatch`] is the library-backed
//! implementation.
//!
//! Implementations are shared read-only across parallel fits (`Sync`); all
//! per-fit state lives in the [`ParamSet`] passed in.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{LibrarySubset, ParamSet, Spectrum, VSINI};
use crate::error::{AppError, FitFailure};
use crate::math::rot_broaden;
use crate::models::library::ModelGrid;
use crate::models::objective::Objective;
use crate::models::spline::eval_continuum;

pub trait SpectralMatch: Sync {
    /// The observed spectrum.
    fn spectrum(&self) -> &Spectrum;

    /// Exclusion mask aligned with the spectrum (`true` = excluded).
    fn mask(&self) -> &[bool];

    /// Model flux (including continuum) on the spectrum's wavelength grid.
    fn model(&self, params: &ParamSet) -> Result<Vec<f64>, FitFailure>;

    /// Continuum evaluated on an arbitrary wavelength grid.
    fn continuum(&self, params: &ParamSet, wav: &[f64]) -> Result<Vec<f64>, FitFailure>;

    /// `flux - model` over the full grid.
    fn resid(&self, params: &ParamSet) -> Result<Vec<f64>, FitFailure> {
        let model = self.model(params)?;
        let spec = self.spectrum();
        let resid: Vec<f64> = spec.flux.iter().zip(&model).map(|(f, m)| f - m).collect();
        if resid.iter().all(|r| r.is_finite()) {
            Ok(resid)
        } else {
            Err(FitFailure::NonFinite { context: "residual" })
        }
    }

    /// Residual in units of the flux uncertainty, full length, with excluded
    /// samples set to zero. This is the vector handed to least squares.
    fn nresid(&self, params: &ParamSet) -> Result<Vec<f64>, FitFailure> {
        let resid = self.resid(params)?;
        let spec = self.spectrum();
        Ok(resid
            .iter()
            .zip(&spec.uflux)
            .zip(self.mask())
            .map(|((r, u), masked)| if *masked { 0.0 } else { r / u })
            .collect())
    }

    /// Normalized residual of the unmasked samples only.
    fn masked_nresid(&self, params: &ParamSet) -> Result<Vec<f64>, FitFailure> {
        let resid = self.resid(params)?;
        let spec = self.spectrum();
        Ok(resid
            .iter()
            .zip(&spec.uflux)
            .zip(self.mask())
            .filter(|(_, masked)| !**masked)
            .map(|((r, u), _)| r / u)
            .collect())
    }

    /// Number of samples that take part in the fit.
    fn n_unmasked(&self) -> usize {
        self.mask().iter().filter(|m| !**m).count()
    }

    fn objective(&self, kind: Objective, params: &ParamSet) -> Result<f64, FitFailure> {
        kind.compute(self, params)
    }
}

/// How the continuum multiplying the library model is parameterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuumMethod {
    /// Piecewise-linear through the `sp<wav>` node parameters.
    SplineDd,
    /// No continuum (spectrum already normalized).
    Unit,
}

/// Library-backed match: interpolated library model, rotationally
/// broadened by `vsini`, times the continuum.
#[derive(Debug, Clone)]
pub struct SpectrumMatch {
    spec: Spectrum,
    mask: Vec<bool>,
    grid: ModelGrid,
    continuum: ContinuumMethod,
}

impl SpectrumMatch {
    pub fn new(
        spec: Spectrum,
        lib: &LibrarySubset,
        mask: Vec<bool>,
        continuum: ContinuumMethod,
    ) -> Result<Self, AppError> {
        spec.validate()?;
        if mask.len() != spec.len() {
            return Err(AppError::config(format!(
                "Mask length {} does not match spectrum length {}.",
                mask.len(),
                spec.len()
            )));
        }
        if mask.iter().all(|m| *m) {
            return Err(AppError::config("Every spectrum sample is excluded."));
        }
        let grid = ModelGrid::new(lib, &spec.wav)?;
        Ok(Self {
            spec,
            mask,
            grid,
            continuum,
        })
    }

    /// Broadened library model without continuum.
    pub fn line_model(&self, params: &ParamSet) -> Result<Vec<f64>, FitFailure> {
        let teff = params.require("teff").map_err(FitFailure::Model)?;
        let logg = params.require("logg").map_err(FitFailure::Model)?;
        let fe = params.require("fe").map_err(FitFailure::Model)?;
        let vsini = params.require(VSINI).map_err(FitFailure::Model)?;
        if !(teff.is_finite() && logg.is_finite() && fe.is_finite() && vsini.is_finite()) {
            return Err(FitFailure::NonFinite { context: "parameters" });
        }

        let base = self.grid.synthesize(teff, logg, fe);
        Ok(rot_broaden(&self.spec.wav, &base, vsini))
    }
}

impl SpectralMatch for SpectrumMatch {
    fn spectrum(&self) -> &Spectrum {
        &self.spec
    }

    fn mask(&self) -> &[bool] {
        &self.mask
    }

    fn model(&self, params: &ParamSet) -> Result<Vec<f64>, FitFailure> {
        let lines = self.line_model(params)?;
        let cont = self.continuum(params, &self.spec.wav)?;
        Ok(lines.iter().zip(&cont).map(|(l, c)| l * c).collect())
    }

    fn continuum(&self, params: &ParamSet, wav: &[f64]) -> Result<Vec<f64>, FitFailure> {
        match self.continuum {
            ContinuumMethod::SplineDd => Ok(eval_continuum(params, wav)),
            ContinuumMethod::Unit => Ok(vec![1.0; wav.len()]),
        }
    }
}
