// Output adapters for reconciled grids and run reports

pub mod csv_grid_output;
pub mod in_memory_output;
pub mod json_report_output;

pub use csv_grid_output::CsvGridOutput;
pub use in_memory_output::InMemoryOutput;
pub use json_report_output::{write_report_json, JsonReportOutput};
