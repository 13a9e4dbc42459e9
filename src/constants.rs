/// Column and policy constants shared across the reconciliation pipeline.
/// These mirror the layout of the Swiss cantonal COVID-19 open data files.

// Structural columns of the source CSV
pub const DATE_COLUMN: &str = "date";
pub const GROUP_COLUMN: &str = "abbreviation_canton_and_fl";
pub const TIME_COLUMN: &str = "time";
pub const SOURCE_COLUMN: &str = "source";

// Cumulative counters published per canton
pub const NCUMUL_TESTED: &str = "ncumul_tested";
pub const NCUMUL_CONF: &str = "ncumul_conf";
pub const NCUMUL_HOSP: &str = "ncumul_hosp";
pub const NCUMUL_ICU: &str = "ncumul_ICU";
pub const NCUMUL_VENT: &str = "ncumul_vent";
pub const NCUMUL_RELEASED: &str = "ncumul_released";
pub const NCUMUL_DECEASED: &str = "ncumul_deceased";

/// Liechtenstein reports alongside the cantons but is not part of Switzerland
pub const PRINCIPALITY_GROUP: &str = "FL";

/// Recent days are typically under-reported and should not be presented
pub const DEFAULT_TRAILING_DAYS_TO_DROP: usize = 27;

/// Beyond this many groups, per-group curves are replaced by an aggregate
pub const DEFAULT_DISPLAY_GROUP_LIMIT: usize = 8;

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Environment variable pointing at a TOML configuration file
pub const CONFIG_ENV_VAR: &str = "COVID_GRID_CONFIG";

/// All cumulative columns tracked by default
pub fn default_cumulative_columns() -> Vec<String> {
    [
        NCUMUL_TESTED,
        NCUMUL_CONF,
        NCUMUL_HOSP,
        NCUMUL_ICU,
        NCUMUL_VENT,
        NCUMUL_RELEASED,
        NCUMUL_DECEASED,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}
