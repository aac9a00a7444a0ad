use clickhouse::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendPeriod {
    ThreeMonth,
    SixMonth,
    YearOverYear,
}

impl TrendPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendPeriod::ThreeMonth => "3_month",
            TrendPeriod::SixMonth => "6_month",
            TrendPeriod::YearOverYear => "year_over_year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Declining => "declining",
            TrendDirection::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrendResult {
    pub direction: TrendDirection,
    pub percentage_change: f64,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct TrendRow {
    pub practice_id: i64,
    pub organization_id: String,
    pub measure_name: String,
    pub period: String,
    pub direction: String,
    pub percentage_change: f64,
    pub calculated_at: String,
}
