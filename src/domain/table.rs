//! Candidate parameter tables.
//!
//! A [`ParameterTable`] holds one row per candidate parameter set. Each row
//! carries a stable `index` key that survives subsetting, sorting and merging,
//! so coarse and fine results can always be joined back to the input table.
//! Missing values are `NaN`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Result columns appended by the grid search.
pub const RESULT_COLUMNS: [&str; 4] = ["chisq", "rchisq", "logprob", "nfev"];

/// Evaluation state of a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    /// Not evaluated (input tables).
    #[default]
    Pending,
    /// Fit converged and result columns are filled in.
    Ok,
    /// Fit failed; result columns are `NaN`. Holds the failure tag.
    Failed(String),
}

impl RowStatus {
    pub fn label(&self) -> &str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Ok => "ok",
            RowStatus::Failed(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub index: usize,
    pub values: Vec<f64>,
    #[serde(default)]
    pub status: RowStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl ParameterTable {
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Result<Self, AppError> {
        let table = Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        };
        table.validate()?;
        Ok(table)
    }

    /// Check column uniqueness, row widths and index uniqueness. Deserialized
    /// tables must pass through here before use.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.as_str()) {
                return Err(AppError::config(format!("Duplicate table column '{c}'.")));
            }
        }
        let mut seen = HashSet::new();
        for row in &self.rows {
            if row.values.len() != self.columns.len() {
                return Err(AppError::config(format!(
                    "Row {} has {} values, expected {}.",
                    row.index,
                    row.values.len(),
                    self.columns.len()
                )));
            }
            if !seen.insert(row.index) {
                return Err(AppError::config(format!("Duplicate row index {}.", row.index)));
            }
        }
        Ok(())
    }

    pub fn push_row(&mut self, index: usize, values: Vec<f64>) -> Result<(), AppError> {
        if values.len() != self.columns.len() {
            return Err(AppError::config(format!(
                "Row {index} has {} values, expected {}.",
                values.len(),
                self.columns.len()
            )));
        }
        if self.position_of(index).is_some() {
            return Err(AppError::config(format!("Duplicate row index {index}.")));
        }
        self.rows.push(TableRow {
            index,
            values,
            status: RowStatus::Pending,
        });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [TableRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.index).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, AppError> {
        self.column_index(name)
            .ok_or_else(|| AppError::config(format!("Parameter table has no '{name}' column.")))
    }

    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.rows.iter().position(|r| r.index == index)
    }

    /// Value of column `name` in the row with key `index`.
    pub fn get(&self, index: usize, name: &str) -> Option<f64> {
        let col = self.column_index(name)?;
        let pos = self.position_of(index)?;
        Some(self.rows[pos].values[col])
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<f64>, AppError> {
        let col = self.require_column(name)?;
        Ok(self.rows.iter().map(|r| r.values[col]).collect())
    }

    /// Add a column filled with `fill`, or leave an existing one alone.
    /// Returns the column position.
    pub fn ensure_column(&mut self, name: &str, fill: f64) -> usize {
        if let Some(col) = self.column_index(name) {
            return col;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.values.push(fill);
        }
        self.columns.len() - 1
    }

    /// Overwrite an existing column with `value` on every row.
    pub fn fill_column(&mut self, name: &str, value: f64) {
        let col = self.ensure_column(name, value);
        for row in &mut self.rows {
            row.values[col] = value;
        }
    }

    /// Rows with the given keys, in the order given.
    ///
    /// Unknown keys are a configuration error. Repeated keys are kept once.
    pub fn select(&self, indices: &[usize]) -> Result<ParameterTable, AppError> {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(indices.len());
        for &index in indices {
            if !seen.insert(index) {
                continue;
            }
            let pos = self
                .position_of(index)
                .ok_or_else(|| AppError::config(format!("Row index {index} is not in the parameter table.")))?;
            rows.push(self.rows[pos].clone());
        }
        Ok(ParameterTable {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Keep rows for which `keep` returns true.
    pub fn filter(&self, mut keep: impl FnMut(&TableRow) -> bool) -> ParameterTable {
        ParameterTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Rows of `self` followed by rows of `other`. Column sets must match.
    pub fn concat(mut self, other: ParameterTable) -> Result<ParameterTable, AppError> {
        if self.columns != other.columns {
            return Err(AppError::pipeline("Cannot concatenate tables with different columns."));
        }
        self.rows.extend(other.rows);
        self.validate()?;
        Ok(self)
    }

    /// Rows sorted ascending by `column`, `NaN` last. The sort is stable:
    /// ties keep table order.
    pub fn sorted_by(&self, column: &str) -> Result<ParameterTable, AppError> {
        let col = self.require_column(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            let (x, y) = (a.values[col], b.values[col]);
            match (x.is_nan(), y.is_nan()) {
                (false, false) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                (false, true) => std::cmp::Ordering::Less,
                (true, false) => std::cmp::Ordering::Greater,
                (true, true) => std::cmp::Ordering::Equal,
            }
        });
        Ok(ParameterTable {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// First `n` rows (all rows if fewer).
    pub fn head(&self, n: usize) -> ParameterTable {
        ParameterTable {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// `[min, max]` of a column, ignoring `NaN`. `None` when no finite value exists.
    pub fn column_range(&self, name: &str) -> Result<Option<(f64, f64)>, AppError> {
        let values = self.column_values(name)?;
        let mut range: Option<(f64, f64)> = None;
        for v in values.into_iter().filter(|v| !v.is_nan()) {
            range = Some(match range {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        Ok(range)
    }
}
