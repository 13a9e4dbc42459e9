use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::ports::GridOutputPort;
use crate::constants::{DATE_COLUMN, GROUP_COLUMN};
use crate::error::Result;
use crate::pipeline::processing::grid::DenseGrid;

/// Writes the grid as CSV: date, group, cumulative columns, then the
/// remaining columns. Absent extra values become empty cells.
pub struct CsvGridOutput {
    path: Option<PathBuf>,
    date_header: String,
    group_header: String,
}

impl CsvGridOutput {
    pub fn to_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            date_header: DATE_COLUMN.to_string(),
            group_header: GROUP_COLUMN.to_string(),
        }
    }

    pub fn to_stdout() -> Self {
        Self {
            path: None,
            date_header: DATE_COLUMN.to_string(),
            group_header: GROUP_COLUMN.to_string(),
        }
    }

    /// Use the input's own names for the date and group columns
    pub fn with_headers(mut self, date: &str, group: &str) -> Self {
        self.date_header = date.to_string();
        self.group_header = group.to_string();
        self
    }

    fn write_to<W: Write>(&self, writer: W, grid: &DenseGrid) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        let header = [self.date_header.as_str(), self.group_header.as_str()]
            .into_iter()
            .chain(grid.cumulative_columns().iter().map(String::as_str))
            .chain(grid.extra_columns().iter().map(String::as_str));
        csv_writer.write_record(header)?;

        for row in grid.rows() {
            let record = [row.date.format("%Y-%m-%d").to_string(), row.group.to_string()]
                .into_iter()
                .chain(row.counts.iter().map(u64::to_string))
                .chain(
                    row.extra
                        .iter()
                        .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
                );
            csv_writer.write_record(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl GridOutputPort for CsvGridOutput {
    fn write_grid(&self, grid: &DenseGrid) -> Result<()> {
        match &self.path {
            Some(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                self.write_to(File::create(path)?, grid)?;
                info!(path = %path.display(), rows = grid.len(), "Wrote grid CSV");
            }
            None => self.write_to(io::stdout().lock(), grid)?,
        }
        Ok(())
    }
}
