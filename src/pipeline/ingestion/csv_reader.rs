use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::config::IngestionConfig;
use crate::domain::{GroupKey, RecordTable, ReportRow};
use crate::error::{ReconcileError, Result};

/// Reads a header-bearing CSV of daily reports.
///
/// The date and group columns are required. Ignored columns are dropped;
/// every other column is numeric, with empty, `NA` and `NaN` cells read as
/// not reported.
#[derive(Debug, Clone)]
pub struct CsvTableReader {
    date_column: String,
    group_column: String,
    ignored_columns: Vec<String>,
}

impl Default for CsvTableReader {
    fn default() -> Self {
        Self::new(&IngestionConfig::default())
    }
}

impl CsvTableReader {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            date_column: config.date_column.clone(),
            group_column: config.group_column.clone(),
            ignored_columns: config.ignored_columns.clone(),
        }
    }

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<RecordTable> {
        let file = File::open(path.as_ref())?;
        self.read(file)
    }

    pub fn read<R: Read>(&self, reader: R) -> Result<RecordTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ReconcileError::MissingColumn(name.to_string()))
        };
        let date_idx = position(self.date_column.as_str())?;
        let group_idx = position(self.group_column.as_str())?;

        let value_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|&(i, h)| {
                i != date_idx && i != group_idx && !self.ignored_columns.iter().any(|c| c == h)
            })
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut table = RecordTable::new(value_columns.iter().map(|(_, h)| h.clone()).collect());

        for record in csv_reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let field = |idx: usize| record.get(idx).unwrap_or("");

            let date = parse_date(field(date_idx)).ok_or_else(|| ReconcileError::InvalidDate {
                line,
                value: field(date_idx).to_string(),
            })?;

            let group = field(group_idx);
            if group.is_empty() {
                return Err(ReconcileError::InvalidValue {
                    line,
                    column: self.group_column.clone(),
                    value: String::new(),
                });
            }

            let values = value_columns
                .iter()
                .map(|(idx, column)| parse_value(field(*idx), line, column))
                .collect::<Result<Vec<_>>>()?;

            table.push_row(ReportRow {
                date,
                group: GroupKey::new(group),
                values,
            })?;
        }

        crate::observability::metrics::ingestion::rows_read(table.len());
        info!(
            rows = table.len(),
            columns = table.columns().len(),
            "Read report table"
        );
        Ok(table)
    }
}

/// ISO-8601 calendar date; a trailing time component is ignored
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

fn parse_value(raw: &str, line: u64, column: &str) -> Result<Option<f64>> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
        _ => Err(ReconcileError::InvalidValue {
            line,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}
