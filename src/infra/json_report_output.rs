use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::ports::ReportOutputPort;
use crate::app::reconcile_use_case::ReconciliationReport;
use crate::error::Result;

/// Writes the reconciliation report as pretty-printed JSON
pub struct JsonReportOutput {
    path: PathBuf,
}

impl JsonReportOutput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReportOutputPort for JsonReportOutput {
    fn write_report(&self, report: &ReconciliationReport) -> Result<()> {
        write_report_json(&self.path, report)?;
        info!(path = %self.path.display(), "Wrote reconciliation report");
        Ok(())
    }
}

pub fn write_report_json(path: &Path, report: &ReconciliationReport) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn report_round_trips_through_json_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = ReconciliationReport {
            groups: 2,
            days: 3,
            rows: 6,
            ..Default::default()
        };

        JsonReportOutput::new(&path).write_report(&report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["rows"], 6);
        assert_eq!(value["first_date"], serde_json::Value::Null);
        assert!(value["raw_pass"]["inconsistencies"].as_array().unwrap().is_empty());
    }
}
