//! Per-segment polishing.
//!
//! Each segment gets its own copy of the starting parameters, a fresh set of
//! free continuum nodes spanning the segment, and a Nelder–Mead minimization
//! of the chosen objective. Segments are independent: a failure is reported
//! in that segment's slot and the others carry on.

use serde::Serialize;
use thiserror::Error;

use crate::domain::{ParamSet, VSINI, VSINI_FLOOR, VSINI_MAX};
use crate::error::{AppError, FitFailure};
use crate::fit::exec::{CancelToken, Execution, FitLimits, map_ordered};
use crate::fit::simplex::{SimplexOptions, minimize};
use crate::math::median;
use crate::models::{DEFAULT_NODE_SPACING, Objective, SpectralMatch, add_spline_nodes, clear_spline_nodes, spline_nodes};

#[derive(Debug, Clone)]
pub struct PolishOptions {
    /// Continuum node spacing (Å) within each segment.
    pub node_spacing: f64,
    pub objective: Objective,
    pub simplex: SimplexOptions,
    pub execution: Execution,
    pub limits: FitLimits,
    pub cancel: CancelToken,
}

impl Default for PolishOptions {
    fn default() -> Self {
        Self {
            node_spacing: DEFAULT_NODE_SPACING,
            objective: Objective::Chi2Med,
            simplex: SimplexOptions::default(),
            execution: Execution::Serial,
            limits: FitLimits::default(),
            cancel: CancelToken::new(),
        }
    }
}

/// Polished model of one segment.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentResult {
    pub params: ParamSet,
    pub objective: Objective,
    /// Final objective value.
    pub value: f64,
    pub nfev: usize,
    pub niter: usize,
    pub converged: bool,
    pub wav: Vec<f64>,
    pub model: Vec<f64>,
    pub continuum: Vec<f64>,
    /// `flux - model`, shifted so its median is zero.
    pub resid: Vec<f64>,
}

/// A segment that could not be polished.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("segment {segment} ({wav_min:.1}-{wav_max:.1} A): {reason}")]
pub struct SegmentFailure {
    pub segment: usize,
    pub wav_min: f64,
    pub wav_max: f64,
    pub reason: FitFailure,
}

pub type SegmentOutcome = Result<SegmentResult, SegmentFailure>;

/// Polish `initial` independently against every segment.
///
/// The output has one entry per segment, in input order.
pub fn polish<M: SpectralMatch>(
    segments: &[M],
    initial: &ParamSet,
    options: &PolishOptions,
) -> Result<Vec<SegmentOutcome>, AppError> {
    initial.validate()?;
    if !initial.contains(VSINI) {
        return Err(AppError::config("Starting parameters must define vsini."));
    }
    if !(options.node_spacing.is_finite() && options.node_spacing > 0.0) {
        return Err(AppError::config("Node spacing must be positive."));
    }

    let outcomes = map_ordered(segments, options.execution, &options.cancel, |_, m| {
        polish_segment(m, initial, options)
    });

    Ok(outcomes
        .into_iter()
        .zip(segments)
        .enumerate()
        .map(|(segment, (outcome, m))| {
            outcome.map_err(|reason| {
                let failure = SegmentFailure {
                    segment,
                    wav_min: m.spectrum().wav_min(),
                    wav_max: m.spectrum().wav_max(),
                    reason,
                };
                log::warn!("Polish failed: {failure}");
                failure
            })
        })
        .collect())
}

/// Starting parameters for one segment.
pub fn segment_params<M: SpectralMatch + ?Sized>(m: &M, initial: &ParamSet, node_spacing: f64) -> ParamSet {
    let mut params = initial.clone();
    if let Some(p) = params.get_mut(VSINI) {
        p.min = Some(VSINI_FLOOR);
        p.max = Some(VSINI_MAX);
        p.value = p.clamp(p.value);
    }
    clear_spline_nodes(&mut params);
    let spec = m.spectrum();
    add_spline_nodes(&mut params, &spline_nodes(spec.wav_min(), spec.wav_max(), node_spacing), true);
    params
}

fn polish_segment<M: SpectralMatch + ?Sized>(
    m: &M,
    initial: &ParamSet,
    options: &PolishOptions,
) -> Result<SegmentResult, FitFailure> {
    let start = segment_params(m, initial, options.node_spacing);
    let outcome = minimize(
        |p| m.objective(options.objective, p),
        &start,
        &options.simplex,
        options.limits.start(),
    )?;
    if !outcome.converged {
        log::warn!(
            "Polish did not converge within {} evaluations ({}={:.4})",
            outcome.nfev,
            options.objective.name(),
            outcome.value
        );
    }

    let spec = m.spectrum();
    let model = m.model(&outcome.params)?;
    let continuum = m.continuum(&outcome.params, &spec.wav)?;
    let mut resid = m.resid(&outcome.params)?;
    let centre = median(&resid).unwrap_or(0.0);
    for r in &mut resid {
        *r -= centre;
    }

    Ok(SegmentResult {
        params: outcome.params,
        objective: options.objective,
        value: outcome.value,
        nfev: outcome.nfev,
        niter: outcome.niter,
        converged: outcome.converged,
        wav: spec.wav.clone(),
        model,
        continuum,
        resid,
    })
}
