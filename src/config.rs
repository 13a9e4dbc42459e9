use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::constants;
use crate::error::{ReconcileError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reconcile: ReconcileConfig,
    pub presentation: PresentationConfig,
    pub ingestion: IngestionConfig,
    pub logging: LoggingConfig,
}

/// How cells without a report are filled while densifying the grid.
/// Carry-forward is the only policy for now; new ones slot in as variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillPolicy {
    #[default]
    CarryForward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Columns that get monotonicity enforcement and carry-forward
    pub cumulative_metric_names: Vec<String>,
    /// Refuse to build a grid when a group reports twice on the same day
    pub duplicate_check: bool,
    pub fill_policy: FillPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            cumulative_metric_names: constants::default_cumulative_columns(),
            duplicate_check: true,
            fill_policy: FillPolicy::CarryForward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Most recent calendar days to drop before the grid is presented
    pub trailing_days_to_drop: usize,
    /// Per-group requests above this many groups are aggregated instead
    pub display_group_limit: usize,
    /// Group left out of aggregates unless explicitly included
    pub excluded_group: Option<String>,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            trailing_days_to_drop: constants::DEFAULT_TRAILING_DAYS_TO_DROP,
            display_group_limit: constants::DEFAULT_DISPLAY_GROUP_LIMIT,
            excluded_group: Some(constants::PRINCIPALITY_GROUP.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub date_column: String,
    pub group_column: String,
    /// Non-numeric columns dropped on read
    pub ignored_columns: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            date_column: constants::DATE_COLUMN.to_string(),
            group_column: constants::GROUP_COLUMN.to_string(),
            ignored_columns: vec![
                constants::TIME_COLUMN.to_string(),
                constants::SOURCE_COLUMN.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: constants::DEFAULT_LOG_DIRECTORY.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config_path = path.as_ref();
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ReconcileError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path first, then `COVID_GRID_CONFIG`, then built-in defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var(constants::CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let metrics = &self.reconcile.cumulative_metric_names;
        if metrics.is_empty() {
            return Err(ReconcileError::Config(
                "cumulative_metric_names must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = metrics.iter().find(|m| !seen.insert(m.as_str())) {
            return Err(ReconcileError::Config(format!(
                "cumulative metric '{}' listed twice",
                dup
            )));
        }

        if self.presentation.display_group_limit == 0 {
            return Err(ReconcileError::Config(
                "display_group_limit must be at least 1".to_string(),
            ));
        }

        let ingestion = &self.ingestion;
        if ingestion.date_column.trim().is_empty() || ingestion.group_column.trim().is_empty() {
            return Err(ReconcileError::Config(
                "date_column and group_column must be set".to_string(),
            ));
        }
        if ingestion.date_column == ingestion.group_column {
            return Err(ReconcileError::Config(
                "date_column and group_column must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_source_policy() {
        let config = Config::default();
        assert_eq!(config.presentation.trailing_days_to_drop, 27);
        assert_eq!(config.presentation.display_group_limit, 8);
        assert_eq!(config.presentation.excluded_group.as_deref(), Some("FL"));
        assert_eq!(config.reconcile.cumulative_metric_names.len(), 7);
        assert!(config.reconcile.duplicate_check);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[reconcile]
cumulative_metric_names = ["ncumul_conf"]
fill_policy = "carry-forward"

[presentation]
trailing_days_to_drop = 0
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.reconcile.cumulative_metric_names, vec!["ncumul_conf"]);
        assert_eq!(config.reconcile.fill_policy, FillPolicy::CarryForward);
        assert_eq!(config.presentation.trailing_days_to_drop, 0);
        assert_eq!(config.presentation.display_group_limit, 8);
        assert_eq!(config.ingestion.group_column, constants::GROUP_COLUMN);
    }

    #[test]
    fn rejects_zero_display_limit() {
        let mut config = Config::default();
        config.presentation.display_group_limit = 0;
        assert!(matches!(config.validate(), Err(ReconcileError::Config(_))));
    }

    #[test]
    fn rejects_duplicate_metric_names() {
        let mut config = Config::default();
        config.reconcile.cumulative_metric_names = vec!["a".into(), "a".into()];
        assert!(matches!(config.validate(), Err(ReconcileError::Config(_))));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Config::load("/nonexistent/covid_grid.toml").unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }
}
