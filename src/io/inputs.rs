//! Run inputs: observed spectrum, candidate table, starting parameters.
//!
//! - spectrum and parameter sets are JSON (`Spectrum`, `ParamSet` schemas)
//! - the candidate table is CSV with a header row; an optional `index` column
//!   supplies row keys (otherwise rows are numbered from 0); a `status`
//!   column is ignored so exported result tables can be read back
//!
//! All malformed input is a configuration error (exit code 2).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::StringRecord;

use crate::domain::{ParamSet, ParameterTable, Spectrum};
use crate::error::AppError;

const INDEX_COLUMN: &str = "index";
const STATUS_COLUMN: &str = "status";

pub fn read_spectrum_json(path: &Path) -> Result<Spectrum, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open spectrum '{}': {e}", path.display())))?;
    let spec: Spectrum = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::config(format!("Invalid spectrum JSON '{}': {e}", path.display())))?;
    spec.validate()?;
    Ok(spec)
}

pub fn write_spectrum_json(path: &Path, spec: &Spectrum) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create spectrum '{}': {e}", path.display())))?;
    serde_json::to_writer(file, spec).map_err(|e| AppError::config(format!("Failed to write spectrum JSON: {e}")))?;
    Ok(())
}

pub fn read_params_json(path: &Path) -> Result<ParamSet, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open parameters '{}': {e}", path.display())))?;
    let params: ParamSet = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::config(format!("Invalid parameter JSON '{}': {e}", path.display())))?;
    params.validate()?;
    Ok(params)
}

pub fn read_table_csv(path: &Path) -> Result<ParameterTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open table CSV '{}': {e}", path.display())))?;
    parse_table_csv(file)
}

/// Parse a candidate table. Empty cells become `NaN`.
pub fn parse_table_csv<R: Read>(reader: R) -> Result<ParameterTable, AppError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers: StringRecord = reader
        .headers()
        .map_err(|e| AppError::config(format!("Failed to read table CSV headers: {e}")))?
        .clone();
    let index_col = headers.iter().position(|h| h == INDEX_COLUMN);
    let status_col = headers.iter().position(|h| h == STATUS_COLUMN);
    let skip = |c: usize| Some(c) == index_col || Some(c) == status_col;
    let columns: Vec<&str> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !skip(*i))
        .map(|(_, h)| h)
        .collect();
    let mut table = ParameterTable::new(&columns)?;

    for (row, result) in reader.records().enumerate() {
        // +2: 1-based lines, header on line 1.
        let line = row + 2;
        let record = result.map_err(|e| AppError::config(format!("Table CSV line {line}: {e}")))?;

        let index = match index_col {
            Some(c) => {
                let raw = record.get(c).unwrap_or("");
                raw.parse::<usize>()
                    .map_err(|_| AppError::config(format!("Table CSV line {line}: invalid index '{raw}'.")))?
            }
            None => row,
        };

        let mut values = Vec::with_capacity(columns.len());
        for (c, cell) in record.iter().enumerate() {
            if skip(c) {
                continue;
            }
            values.push(parse_cell(cell).map_err(|msg| AppError::config(format!("Table CSV line {line}: {msg}")))?);
        }
        table.push_row(index, values)?;
    }

    Ok(table)
}

fn parse_cell(s: &str) -> Result<f64, String> {
    if s.is_empty() {
        return Ok(f64::NAN);
    }
    s.parse::<f64>().map_err(|_| format!("invalid number '{s}'."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_with_index_column() {
        let csv = "teff,index,logg,fe,vsini\n5700,12,4.4,0.0,2\n5800,15,4.5,,2\n";
        let t = parse_table_csv(csv.as_bytes()).unwrap();
        assert_eq!(t.columns(), &["teff", "logg", "fe", "vsini"]);
        assert_eq!(t.indices(), vec![12, 15]);
        assert_eq!(t.get(12, "teff"), Some(5700.0));
        assert!(t.get(15, "fe").unwrap().is_nan());
    }

    #[test]
    fn rows_are_numbered_without_index_column() {
        let csv = "teff,logg,fe,vsini\n5700,4.4,0.0,2\n5800,4.5,0.1,2\n";
        let t = parse_table_csv(csv.as_bytes()).unwrap();
        assert_eq!(t.indices(), vec![0, 1]);
    }

    #[test]
    fn status_column_is_ignored() {
        let csv = "index,teff,logg,fe,vsini,status\n3,5700,4.4,0.0,2,pending\n";
        let t = parse_table_csv(csv.as_bytes()).unwrap();
        assert_eq!(t.columns(), &["teff", "logg", "fe", "vsini"]);
        assert_eq!(t.get(3, "vsini"), Some(2.0));
    }

    #[test]
    fn bad_cells_and_duplicate_keys_are_config_errors() {
        let bad = "teff,logg\n57x0,4.4\n";
        assert_eq!(parse_table_csv(bad.as_bytes()).unwrap_err().exit_code(), crate::error::EXIT_CONFIG);

        let dup = "index,teff\n1,5700\n1,5800\n";
        assert_eq!(parse_table_csv(dup.as_bytes()).unwrap_err().exit_code(), crate::error::EXIT_CONFIG);
    }
}
