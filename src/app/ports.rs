use std::sync::Arc;

use crate::app::reconcile_use_case::ReconciliationReport;
use crate::error::Result;
use crate::pipeline::processing::grid::DenseGrid;

/// Destination for a reconciled grid
pub trait GridOutputPort: Send + Sync {
    fn write_grid(&self, grid: &DenseGrid) -> Result<()>;
}

/// Destination for the diagnostics of a reconciliation run
pub trait ReportOutputPort: Send + Sync {
    fn write_report(&self, report: &ReconciliationReport) -> Result<()>;
}

// Shared outputs, so a caller can keep a handle on what was written
impl<T: GridOutputPort + ?Sized> GridOutputPort for Arc<T> {
    fn write_grid(&self, grid: &DenseGrid) -> Result<()> {
        (**self).write_grid(grid)
    }
}

impl<T: ReportOutputPort + ?Sized> ReportOutputPort for Arc<T> {
    fn write_report(&self, report: &ReconciliationReport) -> Result<()> {
        (**self).write_report(report)
    }
}
