//! Export search and polish results.
//!
//! - grid results: CSV, one line per evaluated row (easy to consume in
//!   spreadsheets or downstream scripts)
//! - polish results: JSON with the per-segment arrays

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ParameterTable;
use crate::error::AppError;
use crate::fit::{SegmentOutcome, SegmentResult};
use crate::models::Objective;

/// Write a result table to CSV: `index`, the table columns, then `status`.
pub fn write_results_csv(path: &Path, table: &ParameterTable) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(file, "index,{},status", table.columns().join(","))
        .map_err(|e| AppError::config(format!("Failed to write export CSV header: {e}")))?;

    for row in table.rows() {
        let values: Vec<String> = row
            .values
            .iter()
            .map(|v| if v.is_nan() { String::new() } else { format!("{v}") })
            .collect();
        writeln!(file, "{},{},{}", row.index, values.join(","), row.status.label())
            .map_err(|e| AppError::config(format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct PolishFile<'a> {
    tool: &'static str,
    created_at: DateTime<Utc>,
    objective: Objective,
    segments: Vec<SegmentEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct SegmentEntry<'a> {
    segment: usize,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a SegmentResult>,
}

/// Write polish outcomes to a JSON file.
pub fn write_polish_json(path: &Path, outcomes: &[SegmentOutcome], objective: Objective) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create polish JSON '{}': {e}", path.display())))?;

    let doc = PolishFile {
        tool: "specfit",
        created_at: Utc::now(),
        objective,
        segments: outcomes
            .iter()
            .enumerate()
            .map(|(segment, outcome)| match outcome {
                Ok(result) => SegmentEntry {
                    segment,
                    status: "ok",
                    error: None,
                    result: Some(result),
                },
                Err(failure) => SegmentEntry {
                    segment,
                    status: failure.reason.tag(),
                    error: Some(failure.to_string()),
                    result: None,
                },
            })
            .collect(),
    };

    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::config(format!("Failed to write polish JSON: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RowStatus;
    use crate::error::FitFailure;
    use crate::fit::SegmentFailure;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("specfit-{}-{name}", std::process::id()))
    }

    #[test]
    fn results_csv_has_status_and_blank_nans() {
        let mut t = ParameterTable::new(&["teff", "rchisq"]).unwrap();
        t.push_row(3, vec![5700.0, 1.5]).unwrap();
        t.push_row(4, vec![5800.0, f64::NAN]).unwrap();
        t.rows_mut()[0].status = RowStatus::Ok;
        t.rows_mut()[1].status = RowStatus::Failed("singular".into());

        let path = temp_path("results.csv");
        write_results_csv(&path, &t).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["index,teff,rchisq,status", "3,5700,1.5,ok", "4,5800,,singular"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn polish_json_records_failures() {
        let outcomes = vec![Err(SegmentFailure {
            segment: 0,
            wav_min: 5000.0,
            wav_max: 5020.0,
            reason: FitFailure::Cancelled,
        })];
        let path = temp_path("polish.json");
        write_polish_json(&path, &outcomes, Objective::Chi2Med).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["objective"], "chi2med");
        assert_eq!(doc["segments"][0]["status"], "cancelled");
        assert!(doc["segments"][0].get("result").is_none());
        let _ = std::fs::remove_file(&path);
    }
}
