use clickhouse::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureScore {
    pub score: f64,
    pub value: f64,
    pub trend: String,
    pub trend_percentage: f64,
    pub percentile: Option<f64>,
    pub peer_average: f64,
    pub peer_count: usize,
}

/// The warehouse row shape. `measure_scores` is stored as a JSON blob and
/// (de)serialized at the service boundary; `insights` likewise.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ReportCardResultRow {
    pub result_id: String,
    pub practice_id: i64,
    pub organization_id: String,
    pub report_card_month: String,
    pub generated_at: String,
    pub overall_score: f64,
    pub size_bucket: String,
    pub percentile_rank: f64,
    pub insights: String,
    pub measure_scores: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportCard {
    pub result_id: String,
    pub practice_id: i64,
    pub organization_id: String,
    pub report_card_month: String,
    pub generated_at: String,
    pub overall_score: f64,
    pub size_bucket: String,
    pub percentile_rank: f64,
    pub insights: Vec<String>,
    pub measure_scores: BTreeMap<String, MeasureScore>,
}

impl From<ReportCardResultRow> for ReportCard {
    fn from(row: ReportCardResultRow) -> Self {
        let insights = serde_json::from_str(&row.insights).unwrap_or_default();
        let measure_scores = serde_json::from_str(&row.measure_scores).unwrap_or_default();
        Self {
            result_id: row.result_id,
            practice_id: row.practice_id,
            organization_id: row.organization_id,
            report_card_month: row.report_card_month,
            generated_at: row.generated_at,
            overall_score: row.overall_score,
            size_bucket: row.size_bucket,
            percentile_rank: row.percentile_rank,
            insights,
            measure_scores,
        }
    }
}

pub fn letter_grade(score: f64) -> &'static str {
    if score >= 90.0 {
        "A"
    } else if score >= 80.0 {
        "B"
    } else {
        "C"
    }
}

pub fn grade_rank(grade: &str) -> u8 {
    match grade {
        "A" => 2,
        "B" => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeHistoryEntry {
    pub report_card_month: String,
    pub overall_score: f64,
    pub grade: &'static str,
    pub score_change: Option<f64>,
    pub grade_improved: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviousMonthSummary {
    pub month_label: String,
    pub score: f64,
    pub grade: &'static str,
    pub score_change: f64,
    pub grade_improved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnualTrend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyScore {
    pub month_label: String,
    pub score: f64,
    pub grade: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearOverYearMeasure {
    pub measure_name: String,
    pub this_year_average: f64,
    pub last_year_average: f64,
    pub improved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnualSummary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub trend: AnnualTrend,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub month_label: String,
    pub projected_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub points: Vec<ForecastPoint>,
    pub confidence: ForecastConfidence,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnualReview {
    pub monthly_scores: Vec<MonthlyScore>,
    pub this_year_average: Option<f64>,
    pub last_year_average: Option<f64>,
    pub this_year_grade: Option<&'static str>,
    pub last_year_grade: Option<&'static str>,
    pub measures: Vec<YearOverYearMeasure>,
    pub summary: Option<AnnualSummary>,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerComparisonMeasure {
    pub measure_name: String,
    pub average: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerComparison {
    pub bucket: String,
    pub measures: Vec<PeerComparisonMeasure>,
}
