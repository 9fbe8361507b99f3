use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::EventRecord;

/// Query surface the KPI engine needs from the event store.
///
/// Null handling is part of the contract: a comparison against a null
/// timestamp never matches. A record with a null `start_time_utc` appears in
/// no start range, and a record missing either boundary never counts as
/// overlapping.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Events with `start_time_utc` in `[start, end)`, in unspecified order.
    async fn find_by_start_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventRecord>>;

    /// Count of events with `start_time_utc < before_end` and
    /// `end_time_utc > after_start`.
    async fn count_overlap(
        &self,
        before_end: DateTime<Utc>,
        after_start: DateTime<Utc>,
    ) -> anyhow::Result<i64>;
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RecordStore for PgRecordStore {
    async fn find_by_start_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            "SELECT id, subject, bed, start_time_utc, end_time_utc, duration, evaluation \
             FROM clinical_kpi.events \
             WHERE start_time_utc >= $1 AND start_time_utc < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch events for window")?;

        let mut events = Vec::new();
        for row in rows {
            events.push(EventRecord {
                id: row.get("id"),
                subject: row.get("subject"),
                bed: row.get("bed"),
                start_time_utc: row.get("start_time_utc"),
                end_time_utc: row.get("end_time_utc"),
                duration: row.get("duration"),
                evaluation: row.get("evaluation"),
            });
        }

        Ok(events)
    }

    async fn count_overlap(
        &self,
        before_end: DateTime<Utc>,
        after_start: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS overlap_count FROM clinical_kpi.events \
             WHERE start_time_utc < $1 AND end_time_utc > $2",
        )
        .bind(before_end)
        .bind(after_start)
        .fetch_one(&self.pool)
        .await
        .context("failed to count overlapping events")?;

        Ok(row.get("overlap_count"))
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let events = vec![
        (
            "seed-001",
            "P-1041",
            Some("B03"),
            Some(Utc.with_ymd_and_hms(2026, 2, 2, 21, 30, 0)),
            Some(Utc.with_ymd_and_hms(2026, 2, 3, 6, 15, 0)),
            Some(8.75),
            Some(serde_json::json!({"sleep_quality": 7.5, "restlessness": 2.0})),
        ),
        (
            "seed-002",
            "P-1044",
            Some("B07"),
            Some(Utc.with_ymd_and_hms(2026, 2, 3, 23, 0, 0)),
            Some(Utc.with_ymd_and_hms(2026, 2, 4, 5, 45, 0)),
            Some(6.75),
            Some(serde_json::json!({"sleep_quality": 5.0, "restlessness": 4.5, "apnea_index": 1.2})),
        ),
        (
            // still in transit, no bed assigned yet
            "seed-003",
            "P-1049",
            None,
            Some(Utc.with_ymd_and_hms(2026, 2, 4, 10, 0, 0)),
            Some(Utc.with_ymd_and_hms(2026, 2, 4, 14, 30, 0)),
            Some(4.5),
            None,
        ),
        (
            // monitoring still running, end and duration unknown
            "seed-004",
            "P-1052",
            Some("B11"),
            Some(Utc.with_ymd_and_hms(2026, 2, 5, 22, 10, 0)),
            None,
            None,
            None,
        ),
    ];

    for (source_key, subject, bed, start, end, duration, evaluation) in events {
        let start_time_utc = match start {
            Some(local) => Some(local.single().context("invalid seed timestamp")?),
            None => None,
        };
        let end_time_utc = match end {
            Some(local) => Some(local.single().context("invalid seed timestamp")?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO clinical_kpi.events
            (id, subject, bed, start_time_utc, end_time_utc, duration, evaluation, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subject)
        .bind(bed)
        .bind(start_time_utc)
        .bind(end_time_utc)
        .bind(duration)
        .bind(evaluation)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        subject: String,
        bed: Option<String>,
        start_time_utc: Option<DateTime<Utc>>,
        end_time_utc: Option<DateTime<Utc>>,
        duration: Option<f64>,
        evaluation: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;

        let evaluation: Option<serde_json::Value> = match row.evaluation.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw).with_context(|| {
                format!("invalid evaluation JSON for subject {}", row.subject)
            })?),
            None => None,
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO clinical_kpi.events
            (id, subject, bed, start_time_utc, end_time_utc, duration, evaluation, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.subject)
        .bind(&row.bed)
        .bind(row.start_time_utc)
        .bind(row.end_time_utc)
        .bind(row.duration)
        .bind(evaluation)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
