//! Daily publication statistics.

use crate::config::MAX_STATS_RANGE_DAYS;
use crate::error::StatsError;
use crate::storage::PublicationStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One point of a daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub date: NaiveDate,
    pub value: f64,
}

/// A named daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub data: Vec<MetricDatum>,
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), StatsError> {
    if start > end {
        return Err(StatsError::InvalidRange { start, end });
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_STATS_RANGE_DAYS {
        return Err(StatsError::RangeTooLong {
            days,
            max: MAX_STATS_RANGE_DAYS,
        });
    }
    Ok(())
}

/// Number of publications created on each UTC day of `[start, end]`.
///
/// Every day of the range is present, in ascending order, days without
/// publications valued 0. Blocked publications are counted.
pub fn new_publications_per_day(
    store: &PublicationStore,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Metric, StatsError> {
    check_range(start, end)?;

    let mut counts: BTreeMap<NaiveDate, f64> = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| (day, 0.0))
        .collect();
    {
        let data = store.data.read();
        for publication in data.publications.values() {
            let day = publication.publication_date.date_naive();
            if let Some(count) = counts.get_mut(&day) {
                *count += 1.0;
            }
        }
    }

    Ok(Metric {
        name: "new_publications_per_day".to_string(),
        data: counts
            .into_iter()
            .map(|(date, value)| MetricDatum { date, value })
            .collect(),
    })
}

/// Every metric over `[start, end]`.
pub fn all_metrics(
    store: &PublicationStore,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Metric>, StatsError> {
    Ok(vec![new_publications_per_day(store, start, end)?])
}
