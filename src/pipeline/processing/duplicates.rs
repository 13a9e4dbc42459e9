use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::domain::{GroupKey, RecordTable};

/// Groups that report more than once on the same day, in order of first
/// appearance. Nothing is repaired here.
#[instrument(skip(table), fields(rows = table.len()))]
pub fn same_day_reports(table: &RecordTable) -> Vec<GroupKey> {
    let mut seen: HashMap<&GroupKey, HashSet<NaiveDate>> = HashMap::new();
    let mut flagged: HashSet<&GroupKey> = HashSet::new();

    for row in table.rows() {
        let dates = seen.entry(&row.group).or_default();
        if !dates.insert(row.date) {
            flagged.insert(&row.group);
        }
    }

    let offenders: Vec<GroupKey> = table
        .groups()
        .into_iter()
        .filter(|g| flagged.contains(g))
        .collect();

    crate::observability::metrics::duplicates::groups_flagged(offenders.len());
    if offenders.is_empty() {
        info!("No groups have same day reports");
    } else {
        warn!(
            groups = ?offenders,
            "{} groups have same day reports",
            offenders.len()
        );
    }

    offenders
}
