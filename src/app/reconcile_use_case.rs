use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::app::ports::{GridOutputPort, ReportOutputPort};
use crate::config::Config;
use crate::domain::{GroupKey, RecordTable};
use crate::error::{ReconcileError, Result};
use crate::pipeline::processing::duplicates::same_day_reports;
use crate::pipeline::processing::grid::{DenseGrid, GridBuilder};
use crate::pipeline::processing::validator::{check_table, ValidationReport};

/// Diagnostics of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    /// Anomalies in the table as reported, before densifying
    pub raw_pass: ValidationReport,
    pub duplicate_groups: Vec<GroupKey>,
    /// Carry-forward sweep over the grid
    pub grid_pass: ValidationReport,
    pub groups: usize,
    pub days: usize,
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Recent days left out of the presented grid
    pub trailing_days_dropped: usize,
}

/// Result of a reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Every day from the first to the last report
    pub grid: DenseGrid,
    /// The grid without its most recent, under-reported days
    pub presented: DenseGrid,
    pub report: ReconciliationReport,
}

/// Outcome of the read-only checks that precede grid construction
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreflightReport {
    pub raw_pass: ValidationReport,
    pub duplicate_groups: Vec<GroupKey>,
}

/// Runs validator, duplicate detector and grid builder over one table, then
/// hands the presented grid and the report to the configured outputs
pub struct ReconcileUseCase {
    metrics: Vec<String>,
    duplicate_check: bool,
    trailing_days_to_drop: usize,
    builder: GridBuilder,
    grid_outputs: Vec<Box<dyn GridOutputPort>>,
    report_outputs: Vec<Box<dyn ReportOutputPort>>,
}

impl ReconcileUseCase {
    pub fn new(config: &Config) -> Self {
        Self {
            metrics: config.reconcile.cumulative_metric_names.clone(),
            duplicate_check: config.reconcile.duplicate_check,
            trailing_days_to_drop: config.presentation.trailing_days_to_drop,
            builder: GridBuilder::from_config(&config.reconcile),
            grid_outputs: Vec::new(),
            report_outputs: Vec::new(),
        }
    }

    pub fn with_grid_output(mut self, output: Box<dyn GridOutputPort>) -> Self {
        self.grid_outputs.push(output);
        self
    }

    pub fn with_report_output(mut self, output: Box<dyn ReportOutputPort>) -> Self {
        self.report_outputs.push(output);
        self
    }

    pub fn with_trailing_days_to_drop(mut self, days: usize) -> Self {
        self.trailing_days_to_drop = days;
        self
    }

    /// First validator pass (no fill) and duplicate detection. The input
    /// table is not modified.
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub fn preflight(&self, table: &RecordTable) -> Result<PreflightReport> {
        if table.is_empty() {
            return Err(ReconcileError::EmptyTable);
        }
        let mut working = table.clone();
        let raw_pass = check_table(&mut working, &self.metrics, false)?;
        let duplicate_groups = same_day_reports(table);
        Ok(PreflightReport {
            raw_pass,
            duplicate_groups,
        })
    }

    /// Reconcile the table and publish the result to every output
    #[instrument(skip(self, table), fields(rows = table.len()))]
    pub fn run(&self, table: &RecordTable) -> Result<ReconcileOutcome> {
        let start = Instant::now();
        match self.reconcile(table) {
            Ok(outcome) => {
                crate::observability::metrics::run::completed(start.elapsed().as_secs_f64());
                info!(
                    raw_anomalies = outcome.report.raw_pass.anomaly_count(),
                    grid_anomalies = outcome.report.grid_pass.anomaly_count(),
                    cells_filled = outcome.report.grid_pass.cells_filled,
                    rows = outcome.report.rows,
                    "Reconciliation finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                crate::observability::metrics::run::failed();
                error!("Reconciliation failed: {}", e);
                Err(e)
            }
        }
    }

    fn reconcile(&self, table: &RecordTable) -> Result<ReconcileOutcome> {
        let (raw_pass, duplicate_groups) = if self.duplicate_check {
            let preflight = self.preflight(table)?;
            (preflight.raw_pass, preflight.duplicate_groups)
        } else {
            if table.is_empty() {
                return Err(ReconcileError::EmptyTable);
            }
            let mut working = table.clone();
            (check_table(&mut working, &self.metrics, false)?, Vec::new())
        };

        if !duplicate_groups.is_empty() {
            return Err(ReconcileError::DuplicateReports(duplicate_groups));
        }

        let build = self.builder.build(table)?;
        let grid = build.grid;
        let presented = grid.clone().without_trailing_days(self.trailing_days_to_drop);

        let report = ReconciliationReport {
            raw_pass,
            duplicate_groups,
            grid_pass: build.validation,
            groups: grid.groups().len(),
            days: grid.dates().len(),
            rows: grid.len(),
            first_date: grid.dates().first().copied(),
            last_date: grid.dates().last().copied(),
            trailing_days_dropped: grid.dates().len() - presented.dates().len(),
        };

        for output in &self.grid_outputs {
            output.write_grid(&presented)?;
        }
        for output in &self.report_outputs {
            output.write_report(&report)?;
        }

        Ok(ReconcileOutcome {
            grid,
            presented,
            report,
        })
    }
}
