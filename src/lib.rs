pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;

// Application layer and its output adapters
pub mod app;
pub mod infra;

// Domain data shapes shared across layers
pub mod domain;

pub use app::reconcile_use_case::{
    PreflightReport, ReconcileOutcome, ReconcileUseCase, ReconciliationReport,
};
pub use config::{Config, FillPolicy};
pub use domain::{GroupKey, InconsistencyRecord, RecordTable, ReportRow};
pub use error::{ReconcileError, Result};
