//! Run metrics for the reconciliation pipeline
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init`].

use std::fmt;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{ReconcileError, Result};

/// Every metric name emitted by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Ingestion
    IngestRowsRead,

    // Validator
    ValidatorAnomalies,
    ValidatorCellsFilled,

    // Duplicate detector
    DuplicateGroupsFlagged,

    // Grid builder
    GridRows,
    GridDays,
    GridGroups,

    // Differencer
    DifferencerSeriesProduced,
    DifferencerForcedAggregations,

    // Whole runs
    RunsCompleted,
    RunsFailed,
    RunDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestRowsRead => "covid_grid_ingest_rows_read_total",
            MetricName::ValidatorAnomalies => "covid_grid_validator_anomalies_total",
            MetricName::ValidatorCellsFilled => "covid_grid_validator_cells_filled_total",
            MetricName::DuplicateGroupsFlagged => "covid_grid_duplicate_groups_flagged_total",
            MetricName::GridRows => "covid_grid_grid_rows",
            MetricName::GridDays => "covid_grid_grid_days",
            MetricName::GridGroups => "covid_grid_grid_groups",
            MetricName::DifferencerSeriesProduced => "covid_grid_differencer_series_total",
            MetricName::DifferencerForcedAggregations => {
                "covid_grid_differencer_forced_aggregations_total"
            }
            MetricName::RunsCompleted => "covid_grid_runs_completed_total",
            MetricName::RunsFailed => "covid_grid_runs_failed_total",
            MetricName::RunDuration => "covid_grid_run_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            IngestRowsRead,
            ValidatorAnomalies,
            ValidatorCellsFilled,
            DuplicateGroupsFlagged,
            GridRows,
            GridDays,
            GridGroups,
            DifferencerSeriesProduced,
            DifferencerForcedAggregations,
            RunsCompleted,
            RunsFailed,
            RunDuration,
        ]
        .into_iter()
    }

    /// (phase, description)
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::IngestRowsRead => ("ingestion", "Report rows read from CSV"),
            MetricName::ValidatorAnomalies => ("validator", "Cumulative values below the running maximum"),
            MetricName::ValidatorCellsFilled => ("validator", "Unreported cells filled by carry-forward"),
            MetricName::DuplicateGroupsFlagged => ("duplicates", "Groups with same day reports"),
            MetricName::GridRows => ("grid", "Rows in the dense grid"),
            MetricName::GridDays => ("grid", "Calendar days spanned by the grid"),
            MetricName::GridGroups => ("grid", "Groups in the grid"),
            MetricName::DifferencerSeriesProduced => ("differencer", "Incremental series produced"),
            MetricName::DifferencerForcedAggregations => ("differencer", "Per-group requests forced to aggregate"),
            MetricName::RunsCompleted => ("run", "Reconciliation runs completed"),
            MetricName::RunsFailed => ("run", "Reconciliation runs failed"),
            MetricName::RunDuration => ("run", "Reconciliation run duration in seconds"),
        }
    }
}

/// Install a Prometheus recorder and return its handle for rendering
pub fn init() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ReconcileError::Metrics(format!("Failed to install Prometheus recorder: {}", e)))?;

    for name in MetricName::all_metrics() {
        let (phase, description) = name.metadata();
        let text = format!("[{}] {}", phase, description);
        match name {
            MetricName::GridRows | MetricName::GridDays | MetricName::GridGroups => {
                ::metrics::describe_gauge!(name.as_str(), text)
            }
            MetricName::RunDuration => ::metrics::describe_histogram!(name.as_str(), text),
            _ => ::metrics::describe_counter!(name.as_str(), text),
        }
    }

    info!("Metrics recorder installed");
    Ok(handle)
}

// ============================================================================
// Ingestion Metrics
// ============================================================================

pub mod ingestion {
    use super::MetricName;

    pub fn rows_read(count: usize) {
        ::metrics::counter!(MetricName::IngestRowsRead.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Validator Metrics
// ============================================================================

pub mod validator {
    use super::MetricName;

    /// `pass` distinguishes the raw-table sweep from the grid sweep
    pub fn anomalies_detected(pass: &'static str, count: usize) {
        ::metrics::counter!(MetricName::ValidatorAnomalies.as_str(), "pass" => pass)
            .increment(count as u64);
    }

    pub fn cells_filled(pass: &'static str, count: usize) {
        ::metrics::counter!(MetricName::ValidatorCellsFilled.as_str(), "pass" => pass)
            .increment(count as u64);
    }
}

// ============================================================================
// Duplicate Detector Metrics
// ============================================================================

pub mod duplicates {
    use super::MetricName;

    pub fn groups_flagged(count: usize) {
        ::metrics::counter!(MetricName::DuplicateGroupsFlagged.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Grid Metrics
// ============================================================================

pub mod grid {
    use super::MetricName;

    pub fn built(rows: usize, days: usize, groups: usize) {
        ::metrics::gauge!(MetricName::GridRows.as_str()).set(rows as f64);
        ::metrics::gauge!(MetricName::GridDays.as_str()).set(days as f64);
        ::metrics::gauge!(MetricName::GridGroups.as_str()).set(groups as f64);
    }
}

// ============================================================================
// Differencer Metrics
// ============================================================================

pub mod differencer {
    use super::MetricName;

    pub fn series_produced(count: usize) {
        ::metrics::counter!(MetricName::DifferencerSeriesProduced.as_str()).increment(count as u64);
    }

    pub fn forced_aggregation() {
        ::metrics::counter!(MetricName::DifferencerForcedAggregations.as_str()).increment(1);
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::MetricName;

    pub fn completed(secs: f64) {
        ::metrics::counter!(MetricName::RunsCompleted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }

    pub fn failed() {
        ::metrics::counter!(MetricName::RunsFailed.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: Vec<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.iter().all(|n| n.starts_with("covid_grid_")));
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        validator::anomalies_detected("raw", 3);
        grid::built(10, 5, 2);
        run::failed();
    }
}
