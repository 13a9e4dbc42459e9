use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::{FillPolicy, ReconcileConfig};
use crate::domain::{GroupKey, RecordTable, ReportRow};
use crate::error::{ReconcileError, Result};
use crate::pipeline::processing::validator::{check_inconsistencies, ValidationReport};

/// One (group, date) slot of the dense grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub date: NaiveDate,
    pub group: GroupKey,
    /// Cumulative columns, carried forward and truncated to whole counts
    pub counts: Vec<u64>,
    /// Remaining columns, copied verbatim and never filled
    pub extra: Vec<Option<f64>>,
}

/// Every group on every calendar day between the first and last report of
/// the whole table. Rows are ordered by date, then by group in order of
/// first appearance.
#[derive(Debug, Clone, Serialize)]
pub struct DenseGrid {
    dates: Vec<NaiveDate>,
    groups: Vec<GroupKey>,
    cumulative: Vec<String>,
    extra: Vec<String>,
    rows: Vec<GridRow>,
    #[serde(skip)]
    index: HashMap<(GroupKey, NaiveDate), usize>,
}

impl DenseGrid {
    fn from_parts(
        dates: Vec<NaiveDate>,
        groups: Vec<GroupKey>,
        cumulative: Vec<String>,
        extra: Vec<String>,
        rows: Vec<GridRow>,
    ) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(pos, row)| ((row.group.clone(), row.date), pos))
            .collect();
        Self {
            dates,
            groups,
            cumulative,
            extra,
            rows,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn groups(&self) -> &[GroupKey] {
        &self.groups
    }

    pub fn cumulative_columns(&self) -> &[String] {
        &self.cumulative
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn contains_group(&self, group: &GroupKey) -> bool {
        self.groups.contains(group)
    }

    pub fn position(&self, group: &GroupKey, date: NaiveDate) -> Option<usize> {
        self.index.get(&(group.clone(), date)).copied()
    }

    pub fn row(&self, group: &GroupKey, date: NaiveDate) -> Option<&GridRow> {
        self.position(group, date).map(|pos| &self.rows[pos])
    }

    pub fn metric_index(&self, metric: &str) -> Result<usize> {
        self.cumulative
            .iter()
            .position(|c| c == metric)
            .ok_or_else(|| ReconcileError::MissingColumn(metric.to_string()))
    }

    pub fn count(&self, group: &GroupKey, date: NaiveDate, metric: &str) -> Option<u64> {
        let column = self.metric_index(metric).ok()?;
        self.row(group, date).map(|row| row.counts[column])
    }

    /// Cumulative series of one group in date order
    pub fn series(&self, group: &GroupKey, metric: &str) -> Result<Vec<u64>> {
        let column = self.metric_index(metric)?;
        if !self.contains_group(group) {
            return Err(ReconcileError::UnknownGroup(group.clone()));
        }
        Ok(self
            .dates
            .iter()
            .filter_map(|&date| self.row(group, date))
            .map(|row| row.counts[column])
            .collect())
    }

    /// Value on the last day of the grid
    pub fn latest(&self, group: &GroupKey, metric: &str) -> Option<u64> {
        let last = *self.dates.last()?;
        self.count(group, last, metric)
    }

    /// Drop the most recent `days` calendar days, which are typically still
    /// under-reported. Dropping every day leaves an empty grid.
    pub fn without_trailing_days(self, days: usize) -> DenseGrid {
        let DenseGrid {
            mut dates,
            groups,
            cumulative,
            extra,
            mut rows,
            ..
        } = self;

        let keep = dates.len().saturating_sub(days);
        dates.truncate(keep);
        rows.truncate(keep * groups.len());
        info!(
            dropped_days = days,
            remaining_days = keep,
            "Trimmed trailing days from grid"
        );

        DenseGrid::from_parts(dates, groups, cumulative, extra, rows)
    }

    /// The grid as a record table: cumulative columns first, then the rest
    pub fn to_table(&self) -> RecordTable {
        let columns = self.cumulative.iter().chain(&self.extra).cloned().collect();
        let rows = self
            .rows
            .iter()
            .map(|row| ReportRow {
                date: row.date,
                group: row.group.clone(),
                values: row
                    .counts
                    .iter()
                    .map(|&c| Some(c as f64))
                    .chain(row.extra.iter().copied())
                    .collect(),
            })
            .collect();
        RecordTable::from_rows(columns, rows)
    }
}

/// Output of a grid build: the grid and the anomaly sweep run while filling
#[derive(Debug, Clone)]
pub struct GridBuild {
    pub grid: DenseGrid,
    pub validation: ValidationReport,
}

/// Densifies a record table into a [`DenseGrid`]
#[derive(Debug, Clone)]
pub struct GridBuilder {
    cumulative: Vec<String>,
    fill_policy: FillPolicy,
}

impl GridBuilder {
    pub fn new(cumulative: Vec<String>) -> Self {
        Self {
            cumulative,
            fill_policy: FillPolicy::default(),
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            cumulative: config.cumulative_metric_names.clone(),
            fill_policy: config.fill_policy,
        }
    }

    /// Build the grid.
    ///
    /// The table must hold at most one report per (group, date); a second
    /// report for an occupied slot fails the build with the offending groups
    /// rather than picking one row.
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub fn build(&self, table: &RecordTable) -> Result<GridBuild> {
        let (min_date, max_date) = table.date_bounds().ok_or(ReconcileError::EmptyTable)?;
        let cumulative_idx = self
            .cumulative
            .iter()
            .map(|m| table.require_column(m))
            .collect::<Result<Vec<_>>>()?;
        let extra_idx: Vec<usize> = (0..table.columns().len())
            .filter(|c| !cumulative_idx.contains(c))
            .collect();

        let dates: Vec<NaiveDate> = min_date
            .iter_days()
            .take_while(|d| *d <= max_date)
            .collect();
        let groups = table.groups();
        let width = table.columns().len();

        // Cross product, date slowest, with a slot index built once
        let mut working = RecordTable::new(table.columns().to_vec());
        let mut slots: HashMap<(&GroupKey, NaiveDate), usize> =
            HashMap::with_capacity(dates.len() * groups.len());
        for &date in &dates {
            for group in &groups {
                let pos = working.push_row(ReportRow {
                    date,
                    group: group.clone(),
                    values: vec![None; width],
                })?;
                slots.insert((group, date), pos);
            }
        }

        let mut occupied = vec![false; working.len()];
        let mut duplicated: Vec<GroupKey> = Vec::new();
        for row in table.rows() {
            let Some(&pos) = slots.get(&(&row.group, row.date)) else {
                continue;
            };
            if occupied[pos] {
                if !duplicated.contains(&row.group) {
                    duplicated.push(row.group.clone());
                }
                continue;
            }
            occupied[pos] = true;
            for (column, value) in row.values.iter().enumerate() {
                if let Some(value) = value {
                    working.set_value(pos, column, *value);
                }
            }
        }
        if !duplicated.is_empty() {
            return Err(ReconcileError::DuplicateReports(duplicated));
        }

        let validation = match self.fill_policy {
            FillPolicy::CarryForward => {
                check_inconsistencies(&mut working, &groups, &self.cumulative, true)?
            }
        };

        let rows: Vec<GridRow> = working
            .rows()
            .iter()
            .map(|row| GridRow {
                date: row.date,
                group: row.group.clone(),
                // whole counts, truncating any fractional input
                counts: cumulative_idx
                    .iter()
                    .map(|&c| row.values[c].map_or(0, |v| v as u64))
                    .collect(),
                extra: extra_idx.iter().map(|&c| row.values[c]).collect(),
            })
            .collect();
        let extra = extra_idx
            .iter()
            .map(|&c| table.columns()[c].clone())
            .collect();

        crate::observability::metrics::grid::built(rows.len(), dates.len(), groups.len());
        info!(
            groups = groups.len(),
            days = dates.len(),
            rows = rows.len(),
            "Built dense grid from {} to {}",
            min_date,
            max_date
        );

        Ok(GridBuild {
            grid: DenseGrid::from_parts(dates, groups, self.cumulative.clone(), extra, rows),
            validation,
        })
    }
}
