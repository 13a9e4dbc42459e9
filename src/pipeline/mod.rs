// Reconciliation pipeline: ingestion and processing stages

pub mod ingestion;
pub mod processing;

// Re-export key types and functions from each stage
pub use ingestion::CsvTableReader;
pub use processing::differencer::{increments, DeltaRequest, DeltaSeries, Differencer, IncrementalSeries, SeriesLabel};
pub use processing::duplicates::same_day_reports;
pub use processing::grid::{DenseGrid, GridBuild, GridBuilder, GridRow};
pub use processing::validator::{check_inconsistencies, check_table, fold_series, CellOutcome, SeriesState, ValidationReport};
