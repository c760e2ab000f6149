//! Synthetic library and observation for demos and tests.
//!
//! The "stellar" model is a fixed list of Gaussian absorption lines whose
//! depths respond to `teff` and `fe` and whose widths respond to `logg`. The
//! observed spectrum is the same model at a chosen truth, rotationally
//! broadened, multiplied by a tilted continuum, plus Gaussian noise.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{LibraryModel, LibrarySubset, ParamSet, ParameterTable, Spectrum, VSINI};
use crate::error::AppError;
use crate::math::rot_broaden;

/// Extra library coverage beyond the observed window (Å).
const LIBRARY_PAD: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub wav_min: f64,
    pub wav_max: f64,
    /// Sampling step of the observed spectrum and library (Å).
    pub step: f64,
    pub teff_grid: Vec<f64>,
    pub logg_grid: Vec<f64>,
    pub fe_grid: Vec<f64>,
    /// True `(teff, logg, fe, vsini)` of the observation.
    pub truth: [f64; 4],
    /// Fractional continuum change across the window.
    pub continuum_tilt: f64,
    pub snr: f64,
    /// Starting `vsini` written into the candidate table.
    pub vsini_start: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            wav_min: 5150.0,
            wav_max: 5210.0,
            step: 0.05,
            teff_grid: (0..7).map(|i| 5000.0 + 250.0 * i as f64).collect(),
            logg_grid: vec![3.5, 4.0, 4.5, 5.0],
            fe_grid: vec![-0.5, -0.25, 0.0, 0.25, 0.5],
            truth: [5750.0, 4.4, 0.1, 4.0],
            continuum_tilt: 0.05,
            snr: 150.0,
            vsini_start: 3.0,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub library: LibrarySubset,
    pub spectrum: Spectrum,
    /// One row per library model (`teff`, `logg`, `fe`, `vsini`).
    pub table: ParameterTable,
    pub truth: ParamSet,
}

#[derive(Debug, Clone, Copy)]
struct Line {
    centre: f64,
    depth: f64,
    /// Depth change per 1000 K.
    teff_slope: f64,
    sigma: f64,
}

pub fn generate(config: &SyntheticConfig) -> Result<SyntheticData, AppError> {
    if !(config.wav_max > config.wav_min && config.step > 0.0) {
        return Err(AppError::config("Invalid synthetic wavelength range."));
    }
    if config.teff_grid.is_empty() || config.logg_grid.is_empty() || config.fe_grid.is_empty() {
        return Err(AppError::config("Synthetic grid axes must not be empty."));
    }
    if !(config.snr.is_finite() && config.snr > 0.0) {
        return Err(AppError::config("Synthetic SNR must be positive."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let lines = line_list(&mut rng, config.wav_min - LIBRARY_PAD, config.wav_max + LIBRARY_PAD);

    let lib_wav = sample_grid(config.wav_min - LIBRARY_PAD, config.wav_max + LIBRARY_PAD, config.step);
    let mut models = Vec::new();
    let mut table = ParameterTable::new(&["teff", "logg", "fe", VSINI])?;
    for &teff in &config.teff_grid {
        for &logg in &config.logg_grid {
            for &fe in &config.fe_grid {
                table.push_row(models.len(), vec![teff, logg, fe, config.vsini_start])?;
                models.push(LibraryModel {
                    teff,
                    logg,
                    fe,
                    flux: line_spectrum(&lines, &lib_wav, teff, logg, fe),
                });
            }
        }
    }
    let library = LibrarySubset { wav: lib_wav, models };

    let [teff, logg, fe, vsini] = config.truth;
    let wav = sample_grid(config.wav_min, config.wav_max, config.step);
    let lines_flux = rot_broaden(&wav, &line_spectrum(&lines, &wav, teff, logg, fe), vsini);
    let noise = Normal::new(0.0, 1.0 / config.snr)
        .map_err(|e| AppError::pipeline(format!("Noise distribution error: {e}")))?;
    let mid = 0.5 * (config.wav_min + config.wav_max);
    let span = config.wav_max - config.wav_min;
    let flux: Vec<f64> = wav
        .iter()
        .zip(&lines_flux)
        .map(|(w, f)| {
            let continuum = 1.0 + config.continuum_tilt * (w - mid) / span;
            f * continuum + noise.sample(&mut rng)
        })
        .collect();
    let uflux = vec![1.0 / config.snr; wav.len()];
    let spectrum = Spectrum::new(wav, flux, uflux)?;

    let mut truth = ParamSet::new();
    truth.add("teff", teff);
    truth.add("logg", logg);
    truth.add("fe", fe);
    truth.add(VSINI, vsini).vary = true;

    Ok(SyntheticData {
        library,
        spectrum,
        table,
        truth,
    })
}

/// Row keys of every `stride`-th value on each grid axis (always including
/// the first). These make a natural coarse set for the search.
pub fn coarse_indices(table: &ParameterTable, stride: usize) -> Result<Vec<usize>, AppError> {
    let stride = stride.max(1);
    let mut keep_axes = Vec::new();
    for name in ["teff", "logg", "fe"] {
        let mut values = table.column_values(name)?;
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        let kept: Vec<f64> = values.into_iter().step_by(stride).collect();
        keep_axes.push((table.require_column(name)?, kept));
    }
    Ok(table
        .rows()
        .iter()
        .filter(|row| keep_axes.iter().all(|(c, kept)| kept.contains(&row.values[*c])))
        .map(|row| row.index)
        .collect())
}

fn sample_grid(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    let n = ((hi - lo) / step).round() as usize + 1;
    (0..n).map(|i| lo + step * i as f64).collect()
}

fn line_list(rng: &mut StdRng, lo: f64, hi: f64) -> Vec<Line> {
    let n = ((hi - lo) / 1.5).round().max(1.0) as usize;
    (0..n)
        .map(|_| Line {
            centre: rng.gen_range(lo..hi),
            depth: rng.gen_range(0.05..0.6),
            teff_slope: rng.gen_range(-0.4..-0.05),
            sigma: rng.gen_range(0.04..0.12),
        })
        .collect()
}

fn line_spectrum(lines: &[Line], wav: &[f64], teff: f64, logg: f64, fe: f64) -> Vec<f64> {
    let metal = 10f64.powf(0.5 * fe);
    let width = 1.0 + 0.15 * (logg - 4.5);
    let mut flux = vec![1.0; wav.len()];
    for line in lines {
        let depth = (line.depth * (1.0 + line.teff_slope * (teff - 5750.0) / 1000.0) * metal).clamp(0.0, 0.95);
        let sigma = line.sigma * width;
        for (f, w) in flux.iter_mut().zip(wav) {
            let x = (w - line.centre) / sigma;
            if x.abs() < 8.0 {
                *f *= 1.0 - depth * (-0.5 * x * x).exp();
            }
        }
    }
    flux
}
