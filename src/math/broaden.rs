//! Rotational broadening.
//!
//! Line profiles of a rotating star are convolved with the classical
//! rotation kernel (Gray, *The Observation and Analysis of Stellar
//! Photospheres*):
//!
//! ```text
//! G(x) ∝ 2(1-ε)·√(1-x²) + (π ε / 2)·(1-x²),   |x| < 1
//! x = Δλ / Δλ_L,   Δλ_L = λ · vsini / c
//! ```
//!
//! Numerical notes:
//! - The kernel width is computed once at the centre of the grid using the
//!   mean dispersion. Fitting segments span tens of Å, so the relative change
//!   of `Δλ_L` across a segment is negligible.
//! - Kernels narrower than half a pixel are an identity.
//! - The kernel half-width is capped at the grid length; anything wider
//!   only smears the clamped edge values further.
//! - Edges are handled by clamping indices (the flux is extended flat).

/// Speed of light in km/s.
pub const C_KMS: f64 = 299_792.458;

/// Linear limb-darkening coefficient used for the kernel.
pub const LIMB_DARKENING: f64 = 0.6;

/// Sampled, normalized rotation kernel for a half-width of `half_px` pixels.
pub fn rotation_kernel(half_px: f64, epsilon: f64) -> Vec<f64> {
    let reach = half_px.ceil() as isize;
    let mut kernel = Vec::with_capacity((2 * reach + 1) as usize);
    for k in -reach..=reach {
        let x = k as f64 / half_px;
        let one_minus = 1.0 - x * x;
        let g = if one_minus > 0.0 {
            2.0 * (1.0 - epsilon) * one_minus.sqrt() + std::f64::consts::FRAC_PI_2 * epsilon * one_minus
        } else {
            0.0
        };
        kernel.push(g);
    }
    let total: f64 = kernel.iter().sum();
    if total > 0.0 {
        for g in &mut kernel {
            *g /= total;
        }
    }
    kernel
}

/// Broaden `flux` sampled on `wav` by `vsini` (km/s).
pub fn rot_broaden(wav: &[f64], flux: &[f64], vsini: f64) -> Vec<f64> {
    let n = wav.len();
    if n < 3 || !(vsini.is_finite() && vsini > 0.0) {
        return flux.to_vec();
    }

    let dwav = (wav[n - 1] - wav[0]) / (n as f64 - 1.0);
    let wav_c = 0.5 * (wav[0] + wav[n - 1]);
    let half_px = wav_c * vsini / C_KMS / dwav;
    if half_px < 0.5 {
        return flux.to_vec();
    }
    let half_px = half_px.min(n as f64);

    let kernel = rotation_kernel(half_px, LIMB_DARKENING);
    let reach = (kernel.len() / 2) as isize;
    let last = n as isize - 1;

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, g)| {
                    let j = (i + k as isize - reach).clamp(0, last) as usize;
                    g * flux[j]
                })
                .sum()
        })
        .collect()
}
