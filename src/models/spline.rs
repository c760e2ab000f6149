//! Continuum spline nodes.
//!
//! The continuum is a piecewise-linear curve through `(node_wav, amplitude)`
//! pairs: continuous, with derivative discontinuities at the nodes
//! ("spline-dd"). Each node is an optimizer parameter named `sp<wav>`, where
//! `<wav>` is the node wavelength in whole Å. The match recovers the node
//! positions from the parameter names, so a parameter set fully describes its
//! continuum.

use crate::domain::ParamSet;
use crate::math::interp_all;

/// Default node separation (Å).
pub const DEFAULT_NODE_SPACING: f64 = 20.0;

const NODE_PREFIX: &str = "sp";

/// Node wavelengths spanning `[floor(wav_min), ceil(wav_max)]`.
///
/// The number of nodes is `round(span / spacing)` (at least one); nodes are
/// evenly spaced and truncated to whole Å. A single node sits at
/// `floor(wav_min)`.
pub fn spline_nodes(wav_min: f64, wav_max: f64, spacing: f64) -> Vec<f64> {
    let lo = wav_min.floor();
    let hi = wav_max.ceil();
    let count = ((hi - lo) / spacing).round().max(1.0) as usize;
    if count == 1 {
        return vec![lo];
    }

    let step = (hi - lo) / (count as f64 - 1.0);
    let mut nodes: Vec<f64> = (0..count).map(|i| (lo + step * i as f64).trunc()).collect();
    nodes.dedup();
    nodes
}

/// Parameter name for a node.
pub fn node_name(node_wav: f64) -> String {
    format!("{NODE_PREFIX}{}", node_wav as i64)
}

/// Node wavelength encoded in a parameter name, if it is a node parameter.
pub fn parse_node_name(name: &str) -> Option<f64> {
    name.strip_prefix(NODE_PREFIX)?.parse::<i64>().ok().map(|w| w as f64)
}

/// Add one `sp<wav>` parameter per node, value `1.0`.
///
/// Existing node parameters are reset to `1.0` and take the new `vary` flag.
pub fn add_spline_nodes(params: &mut ParamSet, nodes: &[f64], vary: bool) {
    for &node in nodes {
        let p = params.add(&node_name(node), 1.0);
        p.vary = vary;
    }
}

/// Remove every node parameter.
pub fn clear_spline_nodes(params: &mut ParamSet) {
    params.retain(|p| parse_node_name(&p.name).is_none());
}

/// `(wav, amplitude)` of every node parameter, sorted by wavelength.
pub fn node_amplitudes(params: &ParamSet) -> Vec<(f64, f64)> {
    let mut nodes: Vec<(f64, f64)> = params
        .iter()
        .filter_map(|p| parse_node_name(&p.name).map(|w| (w, p.value)))
        .collect();
    nodes.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    nodes
}

/// Evaluate the piecewise-linear continuum on `wav`. Without nodes the
/// continuum is 1. Beyond the outer nodes it stays flat.
pub fn eval_continuum(params: &ParamSet, wav: &[f64]) -> Vec<f64> {
    let nodes = node_amplitudes(params);
    if nodes.is_empty() {
        return vec![1.0; wav.len()];
    }
    let xp: Vec<f64> = nodes.iter().map(|n| n.0).collect();
    let fp: Vec<f64> = nodes.iter().map(|n| n.1).collect();
    interp_all(wav, &xp, &fp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_span_the_range() {
        let nodes = spline_nodes(5000.3, 5100.7, 20.0);
        assert_eq!(nodes, vec![5000.0, 5025.0, 5050.0, 5075.0, 5101.0]);
    }

    #[test]
    fn narrow_range_gives_single_node() {
        assert_eq!(spline_nodes(5000.2, 5008.9, 20.0), vec![5000.0]);
    }

    #[test]
    fn node_names_roundtrip() {
        assert_eq!(node_name(5025.0), "sp5025");
        assert_eq!(parse_node_name("sp5025"), Some(5025.0));
        assert_eq!(parse_node_name("vsini"), None);
        assert_eq!(parse_node_name("spx"), None);
    }

    #[test]
    fn continuum_interpolates_between_nodes() {
        let mut params = ParamSet::new();
        params.add("teff", 5700.0);
        add_spline_nodes(&mut params, &[5020.0, 5000.0], true);
        params.add("sp5020", 1.2);

        let cont = eval_continuum(&params, &[4990.0, 5000.0, 5010.0, 5020.0, 5030.0]);
        let expected = [1.0, 1.0, 1.1, 1.2, 1.2];
        for (c, e) in cont.iter().zip(expected) {
            assert!((c - e).abs() < 1e-12);
        }
        assert!(params.get("sp5000").unwrap().vary);
    }

    #[test]
    fn clearing_nodes_keeps_other_parameters() {
        let mut params = ParamSet::new();
        params.add("vsini", 3.0);
        add_spline_nodes(&mut params, &[5000.0, 5020.0], false);
        clear_spline_nodes(&mut params);
        assert_eq!(params.len(), 1);
        assert!(params.contains("vsini"));
    }

    #[test]
    fn no_nodes_means_unit_continuum() {
        let params = ParamSet::new();
        assert_eq!(eval_continuum(&params, &[1.0, 2.0]), vec![1.0, 1.0]);
    }
}
