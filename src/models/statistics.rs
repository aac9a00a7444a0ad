use chrono::NaiveDate;
use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// A single (practice, measure, month) observation, ingested out of band.
/// Read-only from this crate's perspective. `period_date` always carries
/// the ClickHouse value formatted as `YYYY-MM-DD`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub practice_id: i64,
    pub organization_id: String,
    pub measure_name: String,
    pub period_date: String,
    pub value: f64,
}

impl StatisticsRow {
    pub fn period_naive(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.period_date, "%Y-%m-%d").ok()
    }

    pub fn organization_uuid(&self) -> Option<uuid::Uuid> {
        if self.organization_id.is_empty() {
            None
        } else {
            uuid::Uuid::parse_str(&self.organization_id).ok()
        }
    }
}
