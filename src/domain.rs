use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Identifier of a reporting region (a canton code such as `ZH`, or `FL`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for GroupKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One observed report: a group's counters on a given day.
/// `values` is aligned with the owning table's column schema; `None` means
/// the column was not reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub group: GroupKey,
    pub values: Vec<Option<f64>>,
}

/// In-memory table of reports sharing one column schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordTable {
    columns: Vec<String>,
    rows: Vec<ReportRow>,
}

impl RecordTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Table from rows already known to match the schema
    pub(crate) fn from_rows(columns: Vec<String>, rows: Vec<ReportRow>) -> Self {
        Self { columns, rows }
    }

    /// Append a row whose values are already aligned with the schema.
    ///
    /// Reported values must be finite and non-negative; `line` in the error
    /// is the 1-based position the row would have taken.
    pub fn push_row(&mut self, row: ReportRow) -> Result<usize> {
        if row.values.len() != self.columns.len() {
            return Err(ReconcileError::SchemaMismatch {
                expected: self.columns.len(),
                found: row.values.len(),
            });
        }
        let bad = row
            .values
            .iter()
            .position(|v| v.is_some_and(|v| !v.is_finite() || v < 0.0));
        if let Some(column) = bad {
            return Err(ReconcileError::InvalidValue {
                line: self.rows.len() as u64 + 1,
                column: self.columns[column].clone(),
                value: format!("{:?}", row.values[column].unwrap_or_default()),
            });
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    /// Append a row from named values; columns not named are left unreported
    pub fn insert(
        &mut self,
        date: NaiveDate,
        group: impl Into<GroupKey>,
        values: &[(&str, f64)],
    ) -> Result<usize> {
        let mut aligned = vec![None; self.columns.len()];
        for (column, value) in values {
            let idx = self.require_column(column)?;
            aligned[idx] = Some(*value);
        }
        self.push_row(ReportRow {
            date,
            group: group.into(),
            values: aligned,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| ReconcileError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.values.get(column).copied().flatten())
    }

    pub(crate) fn set_value(&mut self, row: usize, column: usize, value: f64) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.values.get_mut(column)) {
            *cell = Some(value);
        }
    }

    /// Distinct groups in order of first appearance
    pub fn groups(&self) -> Vec<GroupKey> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(&r.group))
            .map(|r| r.group.clone())
            .collect()
    }

    /// Earliest and latest report date over the whole table
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.rows.iter().map(|r| r.date).min()?;
        let max = self.rows.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Row positions of one group, in date order (stable for equal dates)
    pub fn group_positions(&self, group: &GroupKey) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| &r.group == group)
            .map(|(i, _)| i)
            .collect();
        positions.sort_by_key(|&i| self.rows[i].date);
        positions
    }
}

/// A cumulative value found below the running maximum of its series.
/// Purely diagnostic: the offending cell is never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InconsistencyRecord {
    /// Position of the offending row in the validated table
    pub row: usize,
    pub metric: String,
    pub group: GroupKey,
    pub date: NaiveDate,
    pub value: f64,
    pub running_max: f64,
}
