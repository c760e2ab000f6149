//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the engines only decide *what* to report
//! - output changes are localized

use crate::domain::{GRID_PARAMS, ParameterTable, RowStatus, VSINI};
use crate::fit::{SegmentOutcome, SegmentResult};

/// Column header for grid progress lines.
pub fn grid_header() -> String {
    format!(
        "{:>7} {:>4} {:>4} {:>4} {:>6}  {:>8} {:>4}",
        "row", "teff", "logg", "fe", "vsini", "rchisq", "nfev"
    )
}

/// One grid progress line.
pub fn grid_row(counter: usize, total: usize, teff: f64, logg: f64, fe: f64, vsini: f64, rchisq: f64, nfev: f64) -> String {
    format!("{counter:3}/{total:3} {teff:4.0} {logg:4.1} {fe:+4.1} {vsini:6.1}  {rchisq:8.2} {nfev:4.0}")
}

/// Summary of a finished grid search: counts and the best rows.
pub fn format_grid_summary(results: &ParameterTable, best_n: usize) -> String {
    let mut out = String::new();
    let failed = results
        .rows()
        .iter()
        .filter(|r| matches!(r.status, RowStatus::Failed(_)))
        .count();

    out.push_str("=== specfit - grid search ===\n");
    out.push_str(&format!("Rows: n={} | failed={}\n", results.len(), failed));

    let Ok(sorted) = results.sorted_by("rchisq") else {
        return out;
    };
    let cols: Vec<Option<usize>> = GRID_PARAMS
        .iter()
        .chain(std::iter::once(&VSINI))
        .chain(["rchisq", "nfev"].iter())
        .map(|c| sorted.column_index(c))
        .collect();

    out.push_str("\nBest rows:\n");
    out.push_str(&format!("{:>7} {}\n", "index", grid_header().trim_start_matches(|c: char| c != 't')));
    for row in sorted.head(best_n).rows() {
        let v = |i: usize| cols[i].map(|c| row.values[c]).unwrap_or(f64::NAN);
        out.push_str(&format!(
            "{:>7} {:4.0} {:4.1} {:+4.1} {:6.1}  {:8.2} {:4.0}  {}\n",
            row.index,
            v(0),
            v(1),
            v(2),
            v(3),
            v(4),
            v(5),
            row.status.label()
        ));
    }
    out
}

/// Per-segment summary of a polishing run.
pub fn format_polish_summary(outcomes: &[SegmentOutcome]) -> String {
    let mut out = String::new();
    out.push_str("=== specfit - polish ===\n");
    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(seg) => out.push_str(&format_segment(i, seg)),
            Err(fail) => out.push_str(&format!("[{i}] FAILED: {fail}\n")),
        }
    }
    out
}

fn format_segment(i: usize, seg: &SegmentResult) -> String {
    let mut out = String::new();
    let (lo, hi) = (seg.wav.first().copied().unwrap_or(f64::NAN), seg.wav.last().copied().unwrap_or(f64::NAN));
    out.push_str(&format!(
        "[{i}] {lo:.1}-{hi:.1} A | {}={:.3} | nfev={} | {}\n",
        seg.objective.name(),
        seg.value,
        seg.nfev,
        if seg.converged { "converged" } else { "not converged" }
    ));
    let mut line = String::from("    ");
    for p in seg.params.varying() {
        line.push_str(&format!("{}={:.4} ", p.name, p.value));
    }
    out.push_str(line.trim_end());
    out.push('\n');
    out
}
