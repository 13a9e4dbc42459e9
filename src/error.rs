use thiserror::Error;

use crate::domain::GroupKey;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics recorder error: {0}")]
    Metrics(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid date '{value}' on line {line}")]
    InvalidDate { line: u64, value: String },

    #[error("Invalid value '{value}' for column '{column}' on line {line}")]
    InvalidValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("Row has {found} values but the table has {expected} columns")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("Record table is empty")]
    EmptyTable,

    #[error("{} group(s) have same day reports: {}", .0.len(), join_groups(.0))]
    DuplicateReports(Vec<GroupKey>),

    #[error("Unknown group: {0}")]
    UnknownGroup(GroupKey),

    #[error("Group selection is empty")]
    EmptySelection,

    #[error("No metric column selected")]
    NoMetricSelected,

    #[error("Per-group differencing needs exactly one metric column, got {0}")]
    MultipleMetricsWithoutAggregation(usize),
}

fn join_groups(groups: &[GroupKey]) -> String {
    groups
        .iter()
        .map(GroupKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
