use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::models::{EventRecord, KpiRow, KpiTable, KpiValue};
use crate::store::RecordStore;

/// Result of one window computation: the row written to the table plus a
/// count of records whose evaluation payload had to be skipped.
#[derive(Debug)]
pub struct WindowOutcome {
    pub row: KpiRow,
    pub malformed_evaluations: usize,
}

/// Duration-weighted means over the evaluation parameters of a record set.
#[derive(Debug, Default)]
pub struct WeightedAverages {
    pub columns: BTreeMap<String, f64>,
    pub malformed_records: usize,
}

/// The night a reporting window is scored against: 22:00 UTC on the day
/// before `window_end`'s date through 06:00 UTC on `window_end`'s date.
/// One fixed night per call, however wide the window itself is.
pub fn night_interval(window_end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = window_end.date_naive().and_time(NaiveTime::MIN).and_utc();
    (midnight - Duration::hours(2), midnight + Duration::hours(6))
}

/// Sum of per-record durations in hours. A record missing either boundary
/// contributes zero.
pub fn total_hours(records: &[EventRecord]) -> f64 {
    records
        .iter()
        .map(|record| match (record.start_time_utc, record.end_time_utc) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 3_600_000.0,
            _ => 0.0,
        })
        .sum()
}

/// Flatten the evaluation mappings of the duration-and-evaluation-non-null
/// subset into `weighted_avg_<param>` columns. Each column's mean runs only
/// over the records that carry that parameter. A record whose evaluation is
/// not a flat mapping of numeric scores is skipped for the affected columns
/// and counted in `malformed_records`. A column whose contributing durations
/// sum to zero is dropped rather than emitted as NaN or Inf.
pub fn weighted_averages(records: &[EventRecord]) -> WeightedAverages {
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    let mut malformed = 0usize;

    for record in records {
        let (Some(evaluation), Some(duration)) = (record.evaluation.as_ref(), record.duration)
        else {
            continue;
        };
        let Some(scores) = evaluation.as_object() else {
            malformed += 1;
            continue;
        };

        let mut record_malformed = false;
        for (parameter, score) in scores {
            let Some(score) = score.as_f64() else {
                record_malformed = true;
                continue;
            };
            let entry = sums
                .entry(format!("weighted_avg_{parameter}"))
                .or_insert((0.0, 0.0));
            entry.0 += score * duration;
            entry.1 += duration;
        }
        if record_malformed {
            malformed += 1;
        }
    }

    let columns = sums
        .into_iter()
        .filter_map(|(column, (weighted_sum, weight_sum))| {
            if weight_sum == 0.0 {
                None
            } else {
                Some((column, weighted_sum / weight_sum))
            }
        })
        .collect();

    WeightedAverages {
        columns,
        malformed_records: malformed,
    }
}

/// Compute one KPI row for `[window_start, window_end)` and merge it into
/// `table` under `label`.
///
/// All metrics except the night-event count come from the windowed record
/// set. The night-event count runs against the whole store and is keyed to
/// `window_end`'s date alone, so two windows ending on the same date report
/// the same count. Store failures abort the call; malformed evaluations are
/// skipped per record and surfaced in the outcome.
pub async fn compute_window<S: RecordStore>(
    store: &S,
    table: &mut KpiTable,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    label: &str,
) -> anyhow::Result<WindowOutcome> {
    let windowed = store.find_by_start_range(window_start, window_end).await?;

    let (night_start, night_end) = night_interval(window_end);
    let night_event_count = store.count_overlap(night_end, night_start).await?;

    let averages = weighted_averages(&windowed);
    let in_bed_count = windowed.iter().filter(|record| record.bed.is_none()).count();

    let mut row = KpiRow::new();
    row.insert(
        "patient_count".to_string(),
        KpiValue::Int(windowed.len() as i64),
    );
    row.insert(
        "night_event_count".to_string(),
        KpiValue::Int(night_event_count),
    );
    row.insert(
        "total_hours".to_string(),
        KpiValue::Float(total_hours(&windowed)),
    );
    for (column, value) in &averages.columns {
        row.insert(column.clone(), KpiValue::Float(*value));
    }
    row.insert("in_bed_count".to_string(), KpiValue::Int(in_bed_count as i64));

    table.upsert(label, row.clone());

    Ok(WindowOutcome {
        row,
        malformed_evaluations: averages.malformed_records,
    })
}
