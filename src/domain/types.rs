//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - loaded from JSON inputs
//! - shared read-only across parallel fits
//! - exported alongside results

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Parameter names every grid table must carry.
pub const GRID_PARAMS: [&str; 3] = ["teff", "logg", "fe"];

/// Name of the rotational broadening parameter.
pub const VSINI: &str = "vsini";

/// Lower bound imposed on `vsini` before every fit (km/s).
///
/// Applied in both the grid search and the polishing pass. Narrower profiles
/// are not resolved by the broadening kernel and let the least-squares step
/// wander.
pub const VSINI_FLOOR: f64 = 0.5;

/// Upper bound imposed on `vsini` (km/s). The broadening kernel widens with
/// `vsini`, so an unbounded fit drifting toward ever broader profiles would
/// also get ever slower.
pub const VSINI_MAX: f64 = 500.0;

/// An observed spectrum on a strictly increasing wavelength grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub wav: Vec<f64>,
    pub flux: Vec<f64>,
    /// 1-sigma flux uncertainty per sample.
    pub uflux: Vec<f64>,
}

impl Spectrum {
    pub fn new(wav: Vec<f64>, flux: Vec<f64>, uflux: Vec<f64>) -> Result<Self, AppError> {
        let spec = Self { wav, flux, uflux };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the shape and value invariants. Deserialized spectra must pass
    /// through here before use.
    pub fn validate(&self) -> Result<(), AppError> {
        let n = self.wav.len();
        if n < 2 {
            return Err(AppError::config("Spectrum needs at least 2 samples."));
        }
        if self.flux.len() != n || self.uflux.len() != n {
            return Err(AppError::config(format!(
                "Spectrum arrays differ in length: wav={n}, flux={}, uflux={}.",
                self.flux.len(),
                self.uflux.len()
            )));
        }
        if self.wav.iter().any(|w| !w.is_finite()) {
            return Err(AppError::config("Spectrum wavelengths must be finite."));
        }
        if self.wav.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::config("Spectrum wavelengths must be strictly increasing."));
        }
        if self.uflux.iter().any(|u| !(u.is_finite() && *u > 0.0)) {
            return Err(AppError::config("Spectrum uncertainties must be finite and > 0."));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.wav.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wav.is_empty()
    }

    pub fn wav_min(&self) -> f64 {
        self.wav[0]
    }

    pub fn wav_max(&self) -> f64 {
        self.wav[self.wav.len() - 1]
    }

    /// Samples with `wav_min <= w <= wav_max`, as a new spectrum.
    pub fn segment(&self, wav_min: f64, wav_max: f64) -> Result<Spectrum, AppError> {
        let keep: Vec<usize> = self
            .wav
            .iter()
            .enumerate()
            .filter(|(_, w)| **w >= wav_min && **w <= wav_max)
            .map(|(i, _)| i)
            .collect();
        if keep.len() < 2 {
            return Err(AppError::config(format!(
                "Segment [{wav_min}, {wav_max}] covers fewer than 2 samples."
            )));
        }
        Ok(Spectrum {
            wav: keep.iter().map(|&i| self.wav[i]).collect(),
            flux: keep.iter().map(|&i| self.flux[i]).collect(),
            uflux: keep.iter().map(|&i| self.uflux[i]).collect(),
        })
    }
}

/// Wavelength intervals to leave out of the fit (union of open intervals).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct ExclusionList {
    intervals: Vec<(f64, f64)>,
}

impl ExclusionList {
    /// Build from `(min, max)` pairs. Overlap and ordering are free; a pair
    /// with `min > max` or a non-finite bound is rejected.
    pub fn new(intervals: Vec<(f64, f64)>) -> Result<Self, AppError> {
        for (i, &(lo, hi)) in intervals.iter().enumerate() {
            if !(lo.is_finite() && hi.is_finite()) {
                return Err(AppError::config(format!(
                    "Exclusion interval #{i} has a non-finite bound: [{lo}, {hi}]."
                )));
            }
            if lo > hi {
                return Err(AppError::config(format!(
                    "Exclusion interval #{i} is reversed: [{lo}, {hi}]."
                )));
            }
        }
        Ok(Self { intervals })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn intervals(&self) -> &[(f64, f64)] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl TryFrom<Vec<[f64; 2]>> for ExclusionList {
    type Error = AppError;

    fn try_from(value: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        ExclusionList::new(value.into_iter().map(|[lo, hi]| (lo, hi)).collect())
    }
}

impl From<ExclusionList> for Vec<[f64; 2]> {
    fn from(value: ExclusionList) -> Self {
        value.intervals.into_iter().map(|(lo, hi)| [lo, hi]).collect()
    }
}

/// One synthetic model spectrum of the library grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryModel {
    pub teff: f64,
    pub logg: f64,
    pub fe: f64,
    pub flux: Vec<f64>,
}

/// The part of the library that overlaps a wavelength window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibrarySubset {
    pub wav: Vec<f64>,
    pub models: Vec<LibraryModel>,
}

impl LibrarySubset {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.wav.len() < 2 {
            return Err(AppError::resource("Library covers fewer than 2 wavelength samples."));
        }
        if self.wav.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::resource("Library wavelengths must be strictly increasing."));
        }
        if self.models.is_empty() {
            return Err(AppError::resource("Library contains no models."));
        }
        for (i, m) in self.models.iter().enumerate() {
            if m.flux.len() != self.wav.len() {
                return Err(AppError::resource(format!(
                    "Library model #{i} has {} flux samples, expected {}.",
                    m.flux.len(),
                    self.wav.len()
                )));
            }
        }
        Ok(())
    }

    /// Keep only wavelengths within `[wav_min, wav_max]` (plus one sample of
    /// padding on each side so interpolation onto the window is defined).
    pub fn restrict(&self, wav_min: f64, wav_max: f64) -> LibrarySubset {
        let n = self.wav.len();
        let lo = self.wav.partition_point(|&w| w < wav_min).saturating_sub(1);
        let hi = (self.wav.partition_point(|&w| w <= wav_max) + 1).min(n);
        LibrarySubset {
            wav: self.wav[lo..hi].to_vec(),
            models: self
                .models
                .iter()
                .map(|m| LibraryModel {
                    teff: m.teff,
                    logg: m.logg,
                    fe: m.fe,
                    flux: m.flux[lo..hi].to_vec(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_library() -> LibrarySubset {
        LibrarySubset {
            wav: vec![5000.0, 5001.0, 5002.0, 5003.0, 5004.0, 5005.0],
            models: vec![LibraryModel {
                teff: 5500.0,
                logg: 4.5,
                fe: 0.0,
                flux: vec![1.0, 0.9, 0.8, 0.7, 0.6, 0.5],
            }],
        }
    }

    #[test]
    fn spectrum_rejects_non_increasing_wavelengths() {
        let err = Spectrum::new(vec![1.0, 1.0, 2.0], vec![1.0; 3], vec![0.1; 3]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }

    #[test]
    fn spectrum_segment_is_inclusive() {
        let spec = Spectrum::new(vec![1.0, 2.0, 3.0, 4.0], vec![1.0; 4], vec![0.1; 4]).unwrap();
        let seg = spec.segment(2.0, 3.0).unwrap();
        assert_eq!(seg.wav, vec![2.0, 3.0]);
        assert!(spec.segment(2.1, 2.9).is_err());
    }

    #[test]
    fn exclusion_list_rejects_reversed_interval() {
        assert!(ExclusionList::new(vec![(5019.5, 5018.0)]).is_err());
        assert!(ExclusionList::new(vec![(5018.0, 5018.0), (5010.0, 5030.0)]).is_ok());
    }

    #[test]
    fn exclusion_list_deserializes_from_pairs() {
        let list: ExclusionList = serde_json::from_str("[[5018, 5019.5], [5027.5, 5028.5]]").unwrap();
        assert_eq!(list.intervals(), &[(5018.0, 5019.5), (5027.5, 5028.5)]);
        assert!(serde_json::from_str::<ExclusionList>("[[2, 1]]").is_err());
    }

    #[test]
    fn library_restrict_keeps_one_sample_padding() {
        let lib = tiny_library();
        let sub = lib.restrict(5001.5, 5003.5);
        assert_eq!(sub.wav, vec![5001.0, 5002.0, 5003.0, 5004.0]);
        assert_eq!(sub.models[0].flux, vec![0.9, 0.8, 0.7, 0.6]);
        assert!(sub.validate().is_ok());
    }
}
