use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: Uuid,
    pub subject: String,
    pub bed: Option<String>,
    pub start_time_utc: Option<DateTime<Utc>>,
    pub end_time_utc: Option<DateTime<Utc>>,
    pub duration: Option<f64>,
    pub evaluation: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KpiValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for KpiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KpiValue::Int(value) => write!(f, "{value}"),
            KpiValue::Float(value) => write!(f, "{value:.2}"),
        }
    }
}

pub type KpiRow = BTreeMap<String, KpiValue>;

/// One KPI row per reporting window, keyed by row label. The driver owns the
/// table, the aggregator writes it, and the renderer reads it once every
/// window has been computed.
#[derive(Debug, Default)]
pub struct KpiTable {
    labels: Vec<String>,
    rows: BTreeMap<String, KpiRow>,
}

impl KpiTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `row` into the row for `label`, column by column. Columns not
    /// present in `row` keep whatever value an earlier call left behind.
    pub fn upsert(&mut self, label: &str, row: KpiRow) {
        if !self.rows.contains_key(label) {
            self.labels.push(label.to_string());
        }
        let existing = self.rows.entry(label.to_string()).or_default();
        for (column, value) in row {
            existing.insert(column, value);
        }
    }

    pub fn get(&self, label: &str) -> Option<&KpiRow> {
        self.rows.get(label)
    }

    /// Rows in the order their labels were first inserted.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &KpiRow)> {
        self.labels
            .iter()
            .filter_map(|label| self.rows.get(label).map(|row| (label.as_str(), row)))
    }

    /// Union of all column names observed so far, sorted.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .rows
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
