//! Wavelength exclusion masks.

use crate::domain::ExclusionList;

/// Boolean mask aligned with `wav`; `true` marks an excluded sample.
///
/// A sample is excluded when it lies strictly inside any interval, so the
/// interval endpoints themselves always take part in the fit. Intervals may
/// overlap and come in any order.
pub fn wavmask(wav: &[f64], exclusions: &ExclusionList) -> Vec<bool> {
    let mut mask = vec![false; wav.len()];
    for &(lo, hi) in exclusions.intervals() {
        for (m, w) in mask.iter_mut().zip(wav) {
            if lo < *w && *w < hi {
                *m = true;
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav() -> Vec<f64> {
        vec![5017.0, 5018.0, 5019.0, 5020.0, 5027.0, 5028.0, 5029.0]
    }

    #[test]
    fn excludes_interior_samples_only() {
        let ex = ExclusionList::new(vec![(5018.0, 5019.5), (5027.5, 5028.5)]).unwrap();
        let mask = wavmask(&wav(), &ex);
        assert_eq!(mask, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn empty_list_masks_nothing() {
        let mask = wavmask(&wav(), &ExclusionList::empty());
        assert_eq!(mask.len(), 7);
        assert!(mask.iter().all(|m| !m));
    }

    #[test]
    fn overlapping_and_unsorted_intervals_union() {
        let ex = ExclusionList::new(vec![(5026.0, 5030.0), (5016.0, 5018.5), (5017.5, 5019.5)]).unwrap();
        let mask = wavmask(&wav(), &ex);
        assert_eq!(mask, vec![true, true, true, false, true, true, true]);
    }

    #[test]
    fn degenerate_interval_excludes_nothing() {
        let ex = ExclusionList::new(vec![(5019.0, 5019.0)]).unwrap();
        assert!(wavmask(&wav(), &ex).iter().all(|m| !m));
    }
}
