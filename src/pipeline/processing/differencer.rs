use std::cmp::Reverse;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::PresentationConfig;
use crate::constants;
use crate::domain::GroupKey;
use crate::error::{ReconcileError, Result};
use crate::pipeline::processing::grid::DenseGrid;

/// Day-over-day increments of a cumulative series.
///
/// The first day has no predecessor and reads 0. Drops caused by later
/// corrections are clamped to 0, so increments are never negative.
pub fn increments(cumulative: &[u64]) -> Vec<u64> {
    let mut deltas = Vec::with_capacity(cumulative.len());
    if !cumulative.is_empty() {
        deltas.push(0);
    }
    deltas.extend(cumulative.windows(2).map(|w| w[1].saturating_sub(w[0])));
    deltas
}

/// Which part of the grid to difference, and how
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaRequest {
    /// `None` selects every group of the grid
    pub groups: Option<Vec<GroupKey>>,
    pub metrics: Vec<String>,
    /// Sum across groups (and metrics) before differencing
    pub aggregate: bool,
    /// Removed from the selection before anything else happens
    pub exclude: Option<GroupKey>,
}

impl DeltaRequest {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metrics: vec![metric.into()],
            ..Self::default()
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupKey>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn aggregated(mut self) -> Self {
        self.aggregate = true;
        self
    }

    pub fn excluding(mut self, group: impl Into<GroupKey>) -> Self {
        self.exclude = Some(group.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "group", rename_all = "snake_case")]
pub enum SeriesLabel {
    Aggregate,
    Group(GroupKey),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaSeries {
    pub label: SeriesLabel,
    pub deltas: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncrementalSeries {
    pub dates: Vec<NaiveDate>,
    pub metrics: Vec<String>,
    /// Groups that contributed, after exclusion
    pub groups: Vec<GroupKey>,
    pub series: Vec<DeltaSeries>,
    /// Set when a per-group request was too wide and got aggregated
    pub forced_aggregation: bool,
    pub notices: Vec<String>,
}

/// Turns grid selections into incremental series
#[derive(Debug, Clone)]
pub struct Differencer {
    display_group_limit: usize,
}

impl Default for Differencer {
    fn default() -> Self {
        Self::new(constants::DEFAULT_DISPLAY_GROUP_LIMIT)
    }
}

impl Differencer {
    pub fn new(display_group_limit: usize) -> Self {
        Self {
            display_group_limit,
        }
    }

    pub fn from_config(config: &PresentationConfig) -> Self {
        Self::new(config.display_group_limit)
    }

    #[instrument(skip(self, grid), fields(limit = self.display_group_limit))]
    pub fn difference(&self, grid: &DenseGrid, request: &DeltaRequest) -> Result<IncrementalSeries> {
        if request.metrics.is_empty() {
            return Err(ReconcileError::NoMetricSelected);
        }
        let columns = request
            .metrics
            .iter()
            .map(|m| grid.metric_index(m))
            .collect::<Result<Vec<_>>>()?;

        let selection = self.select_groups(grid, request)?;

        let mut aggregate = request.aggregate;
        let mut notices = Vec::new();
        let mut forced_aggregation = false;
        if !aggregate && selection.len() > self.display_group_limit {
            let notice = format!(
                "{} groups exceed the display limit of {}; aggregating instead",
                selection.len(),
                self.display_group_limit
            );
            warn!("{}", notice);
            crate::observability::metrics::differencer::forced_aggregation();
            notices.push(notice);
            aggregate = true;
            forced_aggregation = true;
        }

        if !aggregate && request.metrics.len() != 1 {
            return Err(ReconcileError::MultipleMetricsWithoutAggregation(
                request.metrics.len(),
            ));
        }

        let series = if aggregate {
            let sums: Vec<u64> = grid
                .dates()
                .iter()
                .map(|&date| {
                    selection
                        .iter()
                        .filter_map(|group| grid.row(group, date))
                        .flat_map(|row| columns.iter().map(move |&c| row.counts[c]))
                        .fold(0u64, u64::saturating_add)
                })
                .collect();
            vec![DeltaSeries {
                label: SeriesLabel::Aggregate,
                deltas: increments(&sums),
            }]
        } else {
            let metric = &request.metrics[0];
            let mut per_group = selection
                .iter()
                .map(|group| Ok((group.clone(), grid.series(group, metric)?)))
                .collect::<Result<Vec<_>>>()?;
            // largest latest value first, ties keep grid order
            per_group.sort_by_key(|(_, cumulative)| Reverse(cumulative.last().copied().unwrap_or(0)));
            per_group
                .into_iter()
                .map(|(group, cumulative)| DeltaSeries {
                    label: SeriesLabel::Group(group),
                    deltas: increments(&cumulative),
                })
                .collect()
        };

        crate::observability::metrics::differencer::series_produced(series.len());
        debug!(
            series = series.len(),
            aggregate, "Differenced {} group(s)", selection.len()
        );

        Ok(IncrementalSeries {
            dates: grid.dates().to_vec(),
            metrics: request.metrics.clone(),
            groups: selection,
            series,
            forced_aggregation,
            notices,
        })
    }

    fn select_groups(&self, grid: &DenseGrid, request: &DeltaRequest) -> Result<Vec<GroupKey>> {
        let requested = match &request.groups {
            Some(groups) => {
                if let Some(unknown) = groups.iter().find(|g| !grid.contains_group(g)) {
                    return Err(ReconcileError::UnknownGroup(unknown.clone()));
                }
                groups.clone()
            }
            None => grid.groups().to_vec(),
        };

        let mut selection: Vec<GroupKey> = Vec::with_capacity(requested.len());
        for group in requested {
            if Some(&group) != request.exclude.as_ref() && !selection.contains(&group) {
                selection.push(group);
            }
        }

        if selection.is_empty() {
            return Err(ReconcileError::EmptySelection);
        }
        Ok(selection)
    }
}
