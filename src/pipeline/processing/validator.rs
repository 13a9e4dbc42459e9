use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::{GroupKey, InconsistencyRecord, RecordTable};
use crate::error::Result;

/// Running state of a single (group, metric) cumulative series.
///
/// Until the first report arrives the series is treated as zero; after that,
/// `running_max` is the largest value seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesState {
    pub has_value: bool,
    pub running_max: f64,
}

/// What the validator decided for one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CellOutcome {
    /// Reported value accepted as the new running maximum
    Kept,
    /// Unreported and fill disabled
    Skipped,
    /// Unreported cell written with the carried value
    Filled(f64),
    /// Reported value below the running maximum, left untouched
    Anomaly,
}

impl SeriesState {
    /// One step of the per-series fold.
    ///
    /// Returns the cell as it reads after the step, the classification, and
    /// the state for the next cell. Filling and flagging never both apply.
    pub fn step(self, cell: Option<f64>, fill: bool) -> (Option<f64>, CellOutcome, SeriesState) {
        match cell {
            None if fill => (
                Some(self.running_max),
                CellOutcome::Filled(self.running_max),
                self,
            ),
            None => (None, CellOutcome::Skipped, self),
            Some(value) if self.has_value && value < self.running_max => {
                (cell, CellOutcome::Anomaly, self)
            }
            Some(value) => (
                cell,
                CellOutcome::Kept,
                SeriesState {
                    has_value: true,
                    running_max: value,
                },
            ),
        }
    }
}

/// Fold a date-ordered series from the zero state
pub fn fold_series<I>(cells: I, fill: bool) -> Vec<(Option<f64>, CellOutcome)>
where
    I: IntoIterator<Item = Option<f64>>,
{
    cells
        .into_iter()
        .scan(SeriesState::default(), |state, cell| {
            let (updated, outcome, next) = state.step(cell, fill);
            *state = next;
            Some((updated, outcome))
        })
        .collect()
}

/// Result of one validator sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub inconsistencies: Vec<InconsistencyRecord>,
    pub cells_filled: usize,
}

impl ValidationReport {
    pub fn anomaly_count(&self) -> usize {
        self.inconsistencies.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// Check that every (group, metric) series never decreases, optionally
/// filling unreported cells by carry-forward.
///
/// Each group's rows are visited in date order. Anomalies are collected and
/// never corrected; an unknown metric column fails before anything is
/// written.
#[instrument(skip(table, groups, metrics), fields(rows = table.len(), groups = groups.len()))]
pub fn check_inconsistencies(
    table: &mut RecordTable,
    groups: &[GroupKey],
    metrics: &[String],
    fill: bool,
) -> Result<ValidationReport> {
    let columns = metrics
        .iter()
        .map(|m| table.require_column(m))
        .collect::<Result<Vec<_>>>()?;

    let positions: Vec<Vec<usize>> = groups.iter().map(|g| table.group_positions(g)).collect();

    let mut report = ValidationReport::default();

    for (metric, &column) in metrics.iter().zip(&columns) {
        for (group, rows) in groups.iter().zip(&positions) {
            let cells: Vec<Option<f64>> = rows.iter().map(|&r| table.value(r, column)).collect();
            let mut state = SeriesState::default();

            for (&row, cell) in rows.iter().zip(cells) {
                let (_, outcome, next) = state.step(cell, fill);
                match outcome {
                    CellOutcome::Filled(value) => {
                        table.set_value(row, column, value);
                        report.cells_filled += 1;
                    }
                    CellOutcome::Anomaly => {
                        let record = InconsistencyRecord {
                            row,
                            metric: metric.clone(),
                            group: group.clone(),
                            date: table.rows()[row].date,
                            value: cell.unwrap_or_default(),
                            running_max: state.running_max,
                        };
                        debug!(
                            "Cumulative number smaller than the previous one. Wrong value for column {} at index {} ({} on {})",
                            metric, row, group, record.date
                        );
                        report.inconsistencies.push(record);
                    }
                    CellOutcome::Kept | CellOutcome::Skipped => {}
                }
                state = next;
            }
        }
    }

    let pass = if fill { "fill" } else { "check" };
    crate::observability::metrics::validator::anomalies_detected(pass, report.anomaly_count());
    crate::observability::metrics::validator::cells_filled(pass, report.cells_filled);

    if report.is_consistent() {
        info!("0 inconsistencies found in cumulative numbers");
    } else {
        warn!(
            "{} inconsistencies found in cumulative numbers",
            report.anomaly_count()
        );
    }
    if fill {
        debug!("{} cells filled by carry-forward", report.cells_filled);
    }

    Ok(report)
}

/// Validate every group of the table
pub fn check_table(table: &mut RecordTable, metrics: &[String], fill: bool) -> Result<ValidationReport> {
    let groups = table.groups();
    check_inconsistencies(table, &groups, metrics, fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn conf() -> Vec<String> {
        vec!["conf".to_string()]
    }

    #[test]
    fn never_reported_reads_as_zero_when_filling() {
        let out = fold_series([None, None, Some(4.0)], true);
        assert_eq!(out[0], (Some(0.0), CellOutcome::Filled(0.0)));
        assert_eq!(out[1], (Some(0.0), CellOutcome::Filled(0.0)));
        assert_eq!(out[2], (Some(4.0), CellOutcome::Kept));
    }

    #[test]
    fn gap_carries_last_value_forward() {
        let out = fold_series([Some(3.0), None, Some(7.0), None], true);
        let cells: Vec<Option<f64>> = out.iter().map(|(c, _)| *c).collect();
        assert_eq!(cells, vec![Some(3.0), Some(3.0), Some(7.0), Some(7.0)]);
    }

    #[test]
    fn decrease_is_flagged_not_corrected() {
        let out = fold_series([Some(10.0), Some(8.0), None, Some(12.0)], true);
        assert_eq!(out[1], (Some(8.0), CellOutcome::Anomaly));
        // carry-forward uses the running maximum, not the anomalous value
        assert_eq!(out[2], (Some(10.0), CellOutcome::Filled(10.0)));
        assert_eq!(out[3], (Some(12.0), CellOutcome::Kept));
    }

    #[test]
    fn gap_without_fill_keeps_running_max() {
        let out = fold_series([Some(10.0), None, Some(9.0)], false);
        assert_eq!(out[1], (None, CellOutcome::Skipped));
        assert_eq!(out[2].1, CellOutcome::Anomaly);
    }

    #[test]
    fn equal_values_are_not_anomalies() {
        let out = fold_series([Some(5.0), Some(5.0)], false);
        assert!(out.iter().all(|(_, o)| *o == CellOutcome::Kept));
    }

    #[test]
    fn decrease_reports_row_and_metric_without_fill() {
        let mut table = RecordTable::new(conf());
        table.insert(day(1), "AA", &[("conf", 10.0)]).unwrap();
        table.insert(day(2), "AA", &[("conf", 8.0)]).unwrap();

        let report = check_table(&mut table, &conf(), false).unwrap();

        assert_eq!(report.anomaly_count(), 1);
        let record = &report.inconsistencies[0];
        assert_eq!(record.row, 1);
        assert_eq!(record.metric, "conf");
        assert_eq!(record.running_max, 10.0);
        assert_eq!(table.value(1, 0), Some(8.0));
    }

    #[test]
    fn rows_are_scanned_in_date_order() {
        let mut table = RecordTable::new(conf());
        table.insert(day(2), "AA", &[("conf", 8.0)]).unwrap();
        table.insert(day(1), "AA", &[("conf", 4.0)]).unwrap();

        let report = check_table(&mut table, &conf(), false).unwrap();
        assert!(report.is_consistent());
    }

    #[test]
    fn groups_are_independent_series() {
        let mut table = RecordTable::new(conf());
        table.insert(day(1), "AA", &[("conf", 50.0)]).unwrap();
        table.insert(day(1), "BB", &[("conf", 1.0)]).unwrap();
        table.insert(day(2), "BB", &[("conf", 2.0)]).unwrap();

        let report = check_table(&mut table, &conf(), false).unwrap();
        assert!(report.is_consistent());
    }

    #[test]
    fn fill_writes_into_table() {
        let mut table = RecordTable::new(conf());
        table.insert(day(1), "AA", &[]).unwrap();
        table.insert(day(2), "AA", &[("conf", 6.0)]).unwrap();
        table.insert(day(3), "AA", &[]).unwrap();

        let report = check_table(&mut table, &conf(), true).unwrap();

        assert_eq!(report.cells_filled, 2);
        assert_eq!(table.value(0, 0), Some(0.0));
        assert_eq!(table.value(2, 0), Some(6.0));
    }

    #[test]
    fn second_fill_pass_is_a_fixed_point() {
        let mut table = RecordTable::new(conf());
        table.insert(day(1), "AA", &[]).unwrap();
        table.insert(day(2), "AA", &[("conf", 6.0)]).unwrap();
        table.insert(day(3), "AA", &[]).unwrap();

        check_table(&mut table, &conf(), true).unwrap();
        let snapshot = table.clone();
        let second = check_table(&mut table, &conf(), true).unwrap();

        assert_eq!(second.cells_filled, 0);
        assert!(second.is_consistent());
        assert_eq!(table, snapshot);
    }

    #[test]
    fn unknown_metric_fails_before_writing() {
        let mut table = RecordTable::new(conf());
        table.insert(day(1), "AA", &[]).unwrap();
        let metrics = vec!["conf".to_string(), "hosp".to_string()];

        let err = check_table(&mut table, &metrics, true).unwrap_err();

        assert!(matches!(err, ReconcileError::MissingColumn(c) if c == "hosp"));
        assert_eq!(table.value(0, 0), None);
    }
}
