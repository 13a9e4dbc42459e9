use std::sync::{Mutex, MutexGuard};

use crate::app::ports::{GridOutputPort, ReportOutputPort};
use crate::app::reconcile_use_case::ReconciliationReport;
use crate::error::Result;
use crate::pipeline::processing::grid::DenseGrid;

/// Keeps every written grid and report in memory
#[derive(Default)]
pub struct InMemoryOutput {
    grids: Mutex<Vec<DenseGrid>>,
    reports: Mutex<Vec<ReconciliationReport>>,
}

impl InMemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grids(&self) -> Vec<DenseGrid> {
        lock(&self.grids).clone()
    }

    pub fn reports(&self) -> Vec<ReconciliationReport> {
        lock(&self.reports).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GridOutputPort for InMemoryOutput {
    fn write_grid(&self, grid: &DenseGrid) -> Result<()> {
        lock(&self.grids).push(grid.clone());
        Ok(())
    }
}

impl ReportOutputPort for InMemoryOutput {
    fn write_report(&self, report: &ReconciliationReport) -> Result<()> {
        lock(&self.reports).push(report.clone());
        Ok(())
    }
}
