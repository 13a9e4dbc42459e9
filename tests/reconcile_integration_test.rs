use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use covid_grid::infra::{CsvGridOutput, InMemoryOutput, JsonReportOutput};
use covid_grid::pipeline::{check_table, CsvTableReader, DeltaRequest, Differencer, SeriesLabel};
use covid_grid::{Config, GroupKey, ReconcileError, ReconcileUseCase};

const REPORTS: &str = "\
date,time,abbreviation_canton_and_fl,ncumul_conf,ncumul_deceased,current_hosp,source
2020-03-01,08:00,ZH,10,,,https://example.org/zh
2020-03-02,08:00,ZH,8,1,3,https://example.org/zh
2020-03-04,08:00,ZH,15,2,,https://example.org/zh
2020-03-02,,FL,1,,,https://example.org/fl
2020-03-03,12:00,GE,4,0,,https://example.org/ge
";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
}

fn config(trailing: usize) -> Config {
    let mut config = Config::default();
    config.reconcile.cumulative_metric_names =
        vec!["ncumul_conf".to_string(), "ncumul_deceased".to_string()];
    config.presentation.trailing_days_to_drop = trailing;
    config
}

fn write_input(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("reports.csv");
    std::fs::write(&path, contents).unwrap();
    path
}

fn read(config: &Config, path: &Path) -> covid_grid::RecordTable {
    CsvTableReader::new(&config.ingestion).read_path(path).unwrap()
}

#[test]
fn csv_in_grid_and_report_out() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, REPORTS);
    let grid_path = dir.path().join("grid.csv");
    let report_path = dir.path().join("report.json");
    let config = config(0);

    let table = read(&config, &input);
    let outcome = ReconcileUseCase::new(&config)
        .with_grid_output(Box::new(CsvGridOutput::to_path(&grid_path)))
        .with_report_output(Box::new(JsonReportOutput::new(&report_path)))
        .run(&table)
        .unwrap();

    // three groups over four days
    assert_eq!(outcome.grid.len(), 12);
    assert_eq!(
        outcome.grid.groups(),
        &[GroupKey::from("ZH"), GroupKey::from("FL"), GroupKey::from("GE")]
    );

    let zh = GroupKey::from("ZH");
    // the drop on 03-02 is flagged, kept, and the gap fills with the running maximum
    assert_eq!(outcome.grid.series(&zh, "ncumul_conf").unwrap(), vec![10, 8, 10, 15]);
    assert_eq!(outcome.grid.series(&zh, "ncumul_deceased").unwrap(), vec![0, 1, 1, 2]);
    assert_eq!(
        outcome.grid.series(&"FL".into(), "ncumul_conf").unwrap(),
        vec![0, 1, 1, 1]
    );
    assert_eq!(
        outcome.grid.series(&"GE".into(), "ncumul_conf").unwrap(),
        vec![0, 0, 4, 4]
    );

    let anomaly = &outcome.report.raw_pass.inconsistencies[0];
    assert_eq!(outcome.report.raw_pass.anomaly_count(), 1);
    assert_eq!((anomaly.group.as_str(), anomaly.date), ("ZH", day(2)));
    assert_eq!(anomaly.metric, "ncumul_conf");

    let csv = std::fs::read_to_string(&grid_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("date,abbreviation_canton_and_fl,ncumul_conf,ncumul_deceased,current_hosp")
    );
    assert_eq!(lines.next(), Some("2020-03-01,ZH,10,0,"));
    assert_eq!(lines.next(), Some("2020-03-01,FL,0,0,"));
    assert_eq!(lines.count(), 10);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["rows"], 12);
    assert_eq!(report["days"], 4);
    assert_eq!(report["first_date"], "2020-03-01");
    assert_eq!(report["grid_pass"]["inconsistencies"].as_array().unwrap().len(), 1);
}

#[test]
fn fill_validation_is_idempotent_on_the_grid() {
    let dir = TempDir::new().unwrap();
    let config = config(0);
    let table = read(&config, &write_input(&dir, REPORTS));

    let outcome = ReconcileUseCase::new(&config).run(&table).unwrap();

    let mut grid_table = outcome.grid.to_table();
    let before = grid_table.clone();
    let again = check_table(&mut grid_table, &config.reconcile.cumulative_metric_names, true).unwrap();

    assert_eq!(again.cells_filled, 0);
    assert_eq!(again.anomaly_count(), outcome.report.grid_pass.anomaly_count());
    assert_eq!(grid_table, before);
}

#[test]
fn trailing_days_are_left_out_of_the_written_grid() {
    let dir = TempDir::new().unwrap();
    let config = config(2);
    let table = read(&config, &write_input(&dir, REPORTS));
    let output = Arc::new(InMemoryOutput::new());

    let outcome = ReconcileUseCase::new(&config)
        .with_grid_output(Box::new(Arc::clone(&output)))
        .run(&table)
        .unwrap();

    assert_eq!(outcome.grid.dates().len(), 4);
    assert_eq!(outcome.report.trailing_days_dropped, 2);
    let written = output.grids();
    assert_eq!(written[0].dates(), &[day(1), day(2)]);
    assert_eq!(written[0].len(), 6);
}

#[test]
fn deltas_exclude_the_principality_and_rank_by_latest() {
    let dir = TempDir::new().unwrap();
    let config = config(0);
    let table = read(&config, &write_input(&dir, REPORTS));
    let grid = ReconcileUseCase::new(&config).run(&table).unwrap().grid;
    let differencer = Differencer::from_config(&config.presentation);

    let total = differencer
        .difference(&grid, &DeltaRequest::new("ncumul_conf").aggregated().excluding("FL"))
        .unwrap();
    assert_eq!(total.groups, vec![GroupKey::from("ZH"), GroupKey::from("GE")]);
    assert_eq!(total.series[0].label, SeriesLabel::Aggregate);
    assert_eq!(total.series[0].deltas, vec![0, 0, 6, 5]);

    let per_group = differencer
        .difference(&grid, &DeltaRequest::new("ncumul_conf").excluding("FL"))
        .unwrap();
    assert!(!per_group.forced_aggregation);
    let labels: Vec<&SeriesLabel> = per_group.series.iter().map(|s| &s.label).collect();
    assert_eq!(
        labels,
        vec![&SeriesLabel::Group("ZH".into()), &SeriesLabel::Group("GE".into())]
    );
    assert_eq!(per_group.series[0].deltas, vec![0, 0, 2, 5]);
    assert_eq!(per_group.series[1].deltas, vec![0, 0, 4, 0]);
    assert!(per_group.series.iter().all(|s| s.deltas.len() == grid.dates().len()));
}

#[test]
fn wide_per_group_request_is_aggregated() {
    let dir = TempDir::new().unwrap();
    let config = config(0);
    let table = read(&config, &write_input(&dir, REPORTS));
    let grid = ReconcileUseCase::new(&config).run(&table).unwrap().grid;

    let result = Differencer::new(2)
        .difference(
            &grid,
            &DeltaRequest::default().with_metrics(vec![
                "ncumul_conf".to_string(),
                "ncumul_deceased".to_string(),
            ]),
        )
        .unwrap();

    assert!(result.forced_aggregation);
    assert_eq!(result.notices.len(), 1);
    assert_eq!(result.series.len(), 1);
    // conf + deceased over ZH, FL, GE: [10, 10, 16, 22]
    assert_eq!(result.series[0].deltas, vec![0, 0, 6, 6]);
}

#[test]
fn same_day_reports_stop_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let csv = "\
date,abbreviation_canton_and_fl,ncumul_conf,ncumul_deceased
2020-03-01,ZH,1,0
2020-03-01,BE,2,0
2020-03-01,ZH,3,0
";
    let config = config(0);
    let table = read(&config, &write_input(&dir, csv));

    let use_case = ReconcileUseCase::new(&config);
    let preflight = use_case.preflight(&table).unwrap();
    assert_eq!(preflight.duplicate_groups, vec![GroupKey::from("ZH")]);

    match use_case.run(&table) {
        Err(ReconcileError::DuplicateReports(groups)) => {
            assert_eq!(groups, vec![GroupKey::from("ZH")])
        }
        other => panic!("expected duplicate reports, got {:?}", other.map(|o| o.report)),
    }
}

#[test]
fn config_file_drives_the_run() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("covid_grid.toml");
    std::fs::write(
        &config_path,
        r#"
[reconcile]
cumulative_metric_names = ["ncumul_conf"]

[presentation]
trailing_days_to_drop = 1
display_group_limit = 1
"#,
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    let table = read(&config, &write_input(&dir, REPORTS));
    let outcome = ReconcileUseCase::new(&config).run(&table).unwrap();

    assert_eq!(outcome.presented.dates().len(), 3);
    // ncumul_deceased is no longer cumulative, so it is copied as is
    assert_eq!(
        outcome.grid.extra_columns(),
        &["ncumul_deceased".to_string(), "current_hosp".to_string()]
    );
}
