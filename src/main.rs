use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use covid_grid::infra::{CsvGridOutput, JsonReportOutput};
use covid_grid::logging::init_logging;
use covid_grid::pipeline::{CsvTableReader, DeltaRequest, Differencer};
use covid_grid::{Config, GroupKey, ReconcileUseCase, RecordTable};

#[derive(Parser)]
#[command(name = "covid_grid")]
#[command(about = "Reconcile sparse cumulative COVID-19 reports into a dense daily grid")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file (falls back to COVID_GRID_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write a Prometheus text snapshot of the run's metrics to this file
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DeltasArgs {
    #[arg(long)]
    input: PathBuf,
    /// Cumulative metric column(s); repeat for several
    #[arg(long = "metric", required = true)]
    metrics: Vec<String>,
    /// Groups to include (comma-separated); every group when omitted
    #[arg(long, value_delimiter = ',')]
    groups: Option<Vec<String>>,
    /// Sum the selection into one series
    #[arg(long)]
    aggregate: bool,
    /// Keep the configured excluded group in the selection
    #[arg(long)]
    include_excluded: bool,
    /// Keep the most recent, under-reported days
    #[arg(long)]
    keep_trailing: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, densify and write the grid
    Reconcile {
        #[arg(long)]
        input: PathBuf,
        /// Grid CSV destination; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
        /// Reconciliation report destination (JSON)
        #[arg(long)]
        report: Option<PathBuf>,
        /// Keep the most recent, under-reported days
        #[arg(long)]
        keep_trailing: bool,
    },
    /// Reconcile, then print day-over-day increments as JSON
    Deltas(DeltasArgs),
    /// Report anomalies and same-day duplicates without building a grid
    Check {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&config.logging.directory);

    let metrics_handle = match &cli.metrics_out {
        Some(_) => Some(covid_grid::observability::init().context("Failed to install metrics recorder")?),
        None => None,
    };

    let result = match cli.command {
        Commands::Reconcile {
            input,
            output,
            report,
            keep_trailing,
        } => run_reconcile(&config, &input, output, report, keep_trailing),
        Commands::Deltas(args) => run_deltas(&config, args),
        Commands::Check { input } => run_check(&config, &input),
    };

    if let (Some(path), Some(handle)) = (&cli.metrics_out, &metrics_handle) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Wrote metrics snapshot");
    }

    result
}

fn read_table(config: &Config, input: &Path) -> anyhow::Result<RecordTable> {
    CsvTableReader::new(&config.ingestion)
        .read_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))
}

fn run_reconcile(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
    keep_trailing: bool,
) -> anyhow::Result<()> {
    let table = read_table(config, input)?;

    let grid_output = match output {
        Some(path) => CsvGridOutput::to_path(path),
        None => CsvGridOutput::to_stdout(),
    }
    .with_headers(&config.ingestion.date_column, &config.ingestion.group_column);

    let mut use_case = ReconcileUseCase::new(config).with_grid_output(Box::new(grid_output));
    if let Some(path) = report {
        use_case = use_case.with_report_output(Box::new(JsonReportOutput::new(path)));
    }
    if keep_trailing {
        use_case = use_case.with_trailing_days_to_drop(0);
    }

    let outcome = use_case.run(&table).context("Reconciliation failed")?;
    let report = &outcome.report;

    eprintln!("\n📊 Reconciliation of {}:", input.display());
    eprintln!("   Groups: {}", report.groups);
    if let (Some(first), Some(last)) = (report.first_date, report.last_date) {
        eprintln!("   Days: {} ({} to {})", report.days, first, last);
    }
    eprintln!("   Anomalies as reported: {}", report.raw_pass.anomaly_count());
    eprintln!("   Anomalies in grid: {}", report.grid_pass.anomaly_count());
    eprintln!("   Cells carried forward: {}", report.grid_pass.cells_filled);
    eprintln!(
        "   Rows written: {} ({} trailing day(s) dropped)",
        outcome.presented.len(),
        report.trailing_days_dropped
    );
    Ok(())
}

fn run_deltas(config: &Config, args: DeltasArgs) -> anyhow::Result<()> {
    let table = read_table(config, &args.input)?;
    let mut use_case = ReconcileUseCase::new(config);
    if args.keep_trailing {
        use_case = use_case.with_trailing_days_to_drop(0);
    }
    let outcome = use_case.run(&table).context("Reconciliation failed")?;

    if outcome.presented.is_empty() {
        warn!(
            days = outcome.report.days,
            dropped = outcome.report.trailing_days_dropped,
            "Every day was trimmed from the grid"
        );
        eprintln!(
            "⚠️  All {} day(s) fall within the trailing trim; pass --keep-trailing to difference them",
            outcome.report.days
        );
    }

    let mut request = DeltaRequest::default().with_metrics(args.metrics);
    if let Some(groups) = args.groups {
        request = request.with_groups(groups.into_iter().map(GroupKey::from).collect());
    }
    if args.aggregate {
        request = request.aggregated();
    }
    if !args.include_excluded {
        if let Some(excluded) = &config.presentation.excluded_group {
            request = request.excluding(excluded.as_str());
        }
    }

    let series = Differencer::from_config(&config.presentation)
        .difference(&outcome.presented, &request)
        .context("Differencing failed")?;
    for notice in &series.notices {
        eprintln!("⚠️  {}", notice);
    }

    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

fn run_check(config: &Config, input: &Path) -> anyhow::Result<()> {
    let table = read_table(config, input)?;
    let preflight = ReconcileUseCase::new(config).preflight(&table)?;

    for record in &preflight.raw_pass.inconsistencies {
        println!(
            "{} {} {}: {} is below the running maximum {}",
            record.date, record.group, record.metric, record.value, record.running_max
        );
    }
    for group in &preflight.duplicate_groups {
        println!("{}: more than one report on the same day", group);
    }

    eprintln!(
        "\n🔎 {} anomaly(ies), {} group(s) with same-day reports",
        preflight.raw_pass.anomaly_count(),
        preflight.duplicate_groups.len()
    );

    if !preflight.duplicate_groups.is_empty() {
        warn!("Duplicates must be resolved before a grid can be built");
        bail!(
            "{} group(s) have same day reports",
            preflight.duplicate_groups.len()
        );
    }
    Ok(())
}
