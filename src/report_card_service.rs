use crate::cache::ChartCache;
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::report_card::{
    letter_grade, AnnualReview, AnnualSummary, AnnualTrend, Forecast, ForecastConfidence, ForecastPoint,
    GradeHistoryEntry, MonthlyScore, PeerComparison, PeerComparisonMeasure, PreviousMonthSummary, ReportCard,
    ReportCardResultRow, YearOverYearMeasure,
};
use crate::models::tenant::TenantIdentity;
use crate::models::trend::TrendRow;
use chrono::Datelike;
use clickhouse::Client;
use std::time::Duration;

/// Tenant-facing reads over generated report-card and trend data.
/// Authorization is re-checked on every call, cache hit or miss — a
/// cached result from one organization must never leak to another.
pub struct ReportCardService {
    ch: Client,
    cache: Option<ChartCache>,
    deadline: Duration,
}

impl ReportCardService {
    pub fn new(ch: Client, cache: Option<ChartCache>) -> Self {
        Self::with_deadline(ch, cache, Duration::from_secs(30))
    }

    pub fn with_deadline(ch: Client, cache: Option<ChartCache>, deadline: Duration) -> Self {
        Self { ch, cache, deadline }
    }

    fn check_organization_access(&self, identity: &TenantIdentity, organization_id: &str) -> AppResult<()> {
        if identity.is_superuser || identity.has_permission("analytics:read:all") {
            return Ok(());
        }
        if !identity.has_permission("analytics:read:organization") {
            return Err(AppError::PermissionDenied(format!(
                "caller cannot access organization {organization_id}"
            )));
        }
        let accessible = identity.organization_ids.iter().any(|id| id.to_string() == organization_id);
        if accessible {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "caller cannot access organization {organization_id}"
            )))
        }
    }

    pub async fn get_by_organization(&self, identity: &TenantIdentity, organization_id: &str) -> AppResult<ReportCard> {
        self.check_organization_access(identity, organization_id)?;
        let cache_key = format!("rc:org:{organization_id}:latest");
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key).await {
                if let Ok(card) = serde_json::from_value((*cached).clone()) {
                    return Ok(card);
                }
            }
        }

        let sql = format!(
            "SELECT result_id, practice_id, organization_id, toString(report_card_month) AS report_card_month, \
             toString(generated_at) AS generated_at, overall_score, size_bucket, percentile_rank, insights, measure_scores \
             FROM report_card_results \
             WHERE organization_id = '{}' AND report_card_month = ( \
               SELECT MAX(report_card_month) FROM report_card_results WHERE organization_id = '{}' \
             ) ORDER BY practice_id ASC LIMIT 1",
            escape(organization_id),
            escape(organization_id),
        );
        let row = with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .fetch_optional::<ReportCardResultRow>()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?
        .ok_or(AppError::ReportCardNotFound)?;
        let card: ReportCard = row.into();

        if let Some(cache) = &self.cache {
            cache.put(cache_key, serde_json::to_value(&card).unwrap_or_default()).await;
        }
        Ok(card)
    }

    pub async fn get_by_organization_and_month(
        &self,
        identity: &TenantIdentity,
        organization_id: &str,
        month: &str,
    ) -> AppResult<ReportCard> {
        self.check_organization_access(identity, organization_id)?;
        let sql = format!(
            "SELECT result_id, practice_id, organization_id, toString(report_card_month) AS report_card_month, \
             toString(generated_at) AS generated_at, overall_score, size_bucket, percentile_rank, insights, measure_scores \
             FROM report_card_results WHERE organization_id = '{}' AND report_card_month = toDate('{}') \
             ORDER BY practice_id ASC LIMIT 1",
            escape(organization_id),
            escape(month),
        );
        let row = with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .fetch_optional::<ReportCardResultRow>()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?
        .ok_or(AppError::ReportCardNotFound)?;
        Ok(row.into())
    }

    pub async fn available_months(
        &self,
        identity: &TenantIdentity,
        organization_id: &str,
        limit: usize,
    ) -> AppResult<Vec<String>> {
        self.check_organization_access(identity, organization_id)?;
        #[derive(clickhouse::Row, serde::Deserialize)]
        struct MonthRow {
            month: String,
        }
        let sql = format!(
            "SELECT DISTINCT toString(report_card_month) AS month FROM report_card_results \
             WHERE organization_id = '{}' ORDER BY month DESC LIMIT {limit}",
            escape(organization_id),
        );
        let rows: Vec<MonthRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;
        Ok(rows.into_iter().map(|r| r.month).collect())
    }

    pub async fn previous_month_summary(
        &self,
        identity: &TenantIdentity,
        organization_id: &str,
    ) -> AppResult<PreviousMonthSummary> {
        self.check_organization_access(identity, organization_id)?;
        let rows = self.score_history(organization_id, 2).await?;
        let mut iter = rows.into_iter();
        let latest = iter.next().ok_or(AppError::ReportCardNotFound)?;
        let previous = iter.next();

        let score_change = previous.as_ref().map(|p| latest.overall_score - p.overall_score).unwrap_or(0.0);
        let grade = letter_grade(latest.overall_score);
        let grade_improved = previous
            .as_ref()
            .map(|p| crate::models::report_card::grade_rank(grade) > crate::models::report_card::grade_rank(letter_grade(p.overall_score)))
            .unwrap_or(false);

        Ok(PreviousMonthSummary {
            month_label: latest.report_card_month,
            score: latest.overall_score,
            grade,
            score_change,
            grade_improved,
        })
    }

    /// Ordered most-recent-first. Index `i` is compared against `i+1`
    /// (the chronologically prior entry) despite the descending order, so
    /// `score_change`/`grade_improved` describe "better than the month
    /// before this one", not "better than the next row in the vec".
    pub async fn grade_history(
        &self,
        identity: &TenantIdentity,
        organization_id: &str,
        limit: usize,
    ) -> AppResult<Vec<GradeHistoryEntry>> {
        self.check_organization_access(identity, organization_id)?;
        let rows = self.score_history(organization_id, limit + 1).await?;

        let mut entries = Vec::new();
        for i in 0..rows.len().min(limit) {
            let current = &rows[i];
            let prior = rows.get(i + 1);
            let grade = letter_grade(current.overall_score);
            let score_change = prior.map(|p| current.overall_score - p.overall_score);
            let grade_improved = prior.map(|p| {
                crate::models::report_card::grade_rank(grade) > crate::models::report_card::grade_rank(letter_grade(p.overall_score))
            });
            entries.push(GradeHistoryEntry {
                report_card_month: current.report_card_month.clone(),
                overall_score: current.overall_score,
                grade,
                score_change,
                grade_improved,
            });
        }
        Ok(entries)
    }

    async fn score_history(&self, organization_id: &str, limit: usize) -> AppResult<Vec<MonthScore>> {
        #[derive(clickhouse::Row, serde::Deserialize)]
        struct Row {
            report_card_month: String,
            overall_score: f64,
        }
        let sql = format!(
            "SELECT toString(report_card_month) AS report_card_month, avg(overall_score) AS overall_score \
             FROM report_card_results WHERE organization_id = '{}' \
             GROUP BY report_card_month ORDER BY report_card_month DESC LIMIT {limit}",
            escape(organization_id),
        );
        let rows: Vec<Row> = with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| MonthScore {
                report_card_month: r.report_card_month,
                overall_score: r.overall_score,
            })
            .collect())
    }

    pub async fn trends_by_organization(
        &self,
        identity: &TenantIdentity,
        organization_id: &str,
        period: &str,
    ) -> AppResult<Vec<TrendRow>> {
        self.check_organization_access(identity, organization_id)?;
        let sql = format!(
            "SELECT practice_id, organization_id, measure_name, period, direction, percentage_change, \
             toString(calculated_at) AS calculated_at FROM trend_rows \
             WHERE organization_id = '{}' AND period = '{}' ORDER BY measure_name ASC",
            escape(organization_id),
            escape(period),
        );
        with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await
    }

    pub async fn annual_review(&self, identity: &TenantIdentity, organization_id: &str) -> AppResult<AnnualReview> {
        self.check_organization_access(identity, organization_id)?;

        #[derive(clickhouse::Row, serde::Deserialize)]
        struct MonthlyRow {
            report_card_month: String,
            overall_score: f64,
        }
        let monthly_sql = format!(
            "SELECT toString(report_card_month) AS report_card_month, avg(overall_score) AS overall_score \
             FROM report_card_results WHERE organization_id = '{}' \
             AND report_card_month >= today() - INTERVAL 24 MONTH \
             GROUP BY report_card_month ORDER BY report_card_month ASC",
            escape(organization_id),
        );
        let monthly_rows: Vec<MonthlyRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&monthly_sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;

        let monthly_scores: Vec<MonthlyScore> = monthly_rows
            .iter()
            .map(|r| MonthlyScore {
                month_label: r.report_card_month.clone(),
                score: r.overall_score,
                grade: letter_grade(r.overall_score),
            })
            .collect();

        // `monthly_scores` spans up to 24 months for display/forecast, but
        // the this-year average is the trailing 12 months of that window.
        let this_year_window: Vec<f64> = monthly_scores
            .iter()
            .rev()
            .take(12)
            .map(|m| m.score)
            .collect();
        let this_year_average = average(&this_year_window);
        let this_year_grade = this_year_average.map(letter_grade);

        #[derive(clickhouse::Row, serde::Deserialize)]
        struct YearAvgRow {
            overall_score: f64,
        }
        let last_year_sql = format!(
            "SELECT avg(overall_score) AS overall_score FROM report_card_results WHERE organization_id = '{}' \
             AND report_card_month >= today() - INTERVAL 24 MONTH AND report_card_month < today() - INTERVAL 12 MONTH",
            escape(organization_id),
        );
        let last_year_average = with_deadline(self.deadline, async {
            self.ch
                .query(&last_year_sql)
                .fetch_optional::<YearAvgRow>()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?
        .map(|r| r.overall_score);
        let last_year_grade = last_year_average.map(letter_grade);

        #[derive(clickhouse::Row, serde::Deserialize)]
        struct MeasureYoyRow {
            measure_name: String,
            this_year_average: f64,
            last_year_average: f64,
        }
        let yoy_sql = format!(
            "SELECT t.measure_name AS measure_name, \
               avgIf(t.percentage_change, t.calculated_at >= today() - INTERVAL 12 MONTH) AS this_year_average, \
               avgIf(t.percentage_change, t.calculated_at < today() - INTERVAL 12 MONTH AND t.calculated_at >= today() - INTERVAL 24 MONTH) AS last_year_average \
             FROM trend_rows t WHERE t.organization_id = '{}' AND t.period = 'year_over_year' GROUP BY t.measure_name",
            escape(organization_id),
        );
        let yoy_rows: Vec<MeasureYoyRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&yoy_sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;
        let measures: Vec<YearOverYearMeasure> = yoy_rows
            .into_iter()
            .map(|r| YearOverYearMeasure {
                improved: r.this_year_average > r.last_year_average,
                measure_name: r.measure_name,
                this_year_average: r.this_year_average,
                last_year_average: r.last_year_average,
            })
            .collect();

        let summary = build_summary(&monthly_scores);
        let forecast = build_forecast(&monthly_scores);

        Ok(AnnualReview {
            monthly_scores,
            this_year_average,
            last_year_average,
            this_year_grade,
            last_year_grade,
            measures,
            summary,
            forecast,
        })
    }

    pub async fn peer_comparison(&self, identity: &TenantIdentity, practice_id: i64) -> AppResult<PeerComparison> {
        if !identity.is_superuser
            && !identity.has_permission("analytics:read:all")
            && !identity.has_permission("analytics:read:organization")
        {
            return Err(AppError::PermissionDenied("caller cannot view peer comparisons".into()));
        }

        #[derive(clickhouse::Row, serde::Deserialize)]
        struct BucketRow {
            bucket: String,
        }
        let bucket = with_deadline(self.deadline, async {
            self.ch
                .query(&format!(
                    "SELECT bucket FROM size_bucket_assignments WHERE practice_id = {practice_id} LIMIT 1"
                ))
                .fetch_optional::<BucketRow>()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?
        .ok_or_else(|| AppError::InsufficientData(format!("practice {practice_id} has no size-bucket assignment")))?
        .bucket;

        #[derive(clickhouse::Row, serde::Deserialize)]
        struct MeasureRow {
            measure_name: String,
            average: f64,
            p25: f64,
            p50: f64,
            p75: f64,
            sample_count: u64,
        }
        let sql = format!(
            "SELECT s.measure_name AS measure_name, avg(s.value) AS average, \
               quantile(0.25)(s.value) AS p25, quantile(0.5)(s.value) AS p50, quantile(0.75)(s.value) AS p75, \
               count(DISTINCT s.practice_id) AS sample_count \
             FROM statistics_rows s INNER JOIN size_bucket_assignments b ON s.practice_id = b.practice_id \
             WHERE b.bucket = '{}' AND s.period_date = (SELECT MAX(period_date) FROM statistics_rows) \
             GROUP BY s.measure_name",
            escape(&bucket),
        );
        let rows: Vec<MeasureRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;

        let measures = rows
            .into_iter()
            .map(|r| PeerComparisonMeasure {
                measure_name: r.measure_name,
                average: r.average,
                p25: r.p25,
                p50: r.p50,
                p75: r.p75,
                sample_count: r.sample_count as usize,
            })
            .collect();

        Ok(PeerComparison { bucket, measures })
    }
}

struct MonthScore {
    report_card_month: String,
    overall_score: f64,
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "\\'")
}

/// Splits the year at the midpoint and compares average score in each
/// half; a move of more than half a grade band counts as a trend.
fn build_summary(monthly: &[MonthlyScore]) -> Option<AnnualSummary> {
    if monthly.is_empty() {
        return None;
    }
    let scores: Vec<f64> = monthly.iter().map(|m| m.score).collect();
    let average = scores.iter().sum::<f64>() / scores.len() as f64;
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let trend = if scores.len() < 4 {
        AnnualTrend::Stable
    } else {
        let mid = scores.len() / 2;
        let first_half = scores[..mid].iter().sum::<f64>() / mid as f64;
        let second_half = scores[mid..].iter().sum::<f64>() / (scores.len() - mid) as f64;
        let delta = second_half - first_half;
        if delta > 2.0 {
            AnnualTrend::Improving
        } else if delta < -2.0 {
            AnnualTrend::Declining
        } else {
            AnnualTrend::Stable
        }
    };

    Some(AnnualSummary {
        average,
        min,
        max,
        count: scores.len(),
        trend,
    })
}

/// Linear-slope projection from the last known month through year-end
/// (at most 6 points). Requires at least 3 months of history; confidence
/// narrows as the history available shrinks.
fn build_forecast(monthly: &[MonthlyScore]) -> Option<Forecast> {
    if monthly.len() < 3 {
        return None;
    }
    let n = monthly.len() as f64;
    let xs: Vec<f64> = (0..monthly.len()).map(|i| i as f64).collect();
    let ys: Vec<f64> = monthly.iter().map(|m| m.score).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let numerator: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let denominator: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    let slope = if denominator.abs() < f64::EPSILON { 0.0 } else { numerator / denominator };
    let intercept = y_mean - slope * x_mean;

    let confidence = if monthly.len() >= 6 {
        ForecastConfidence::High
    } else if monthly.len() >= 3 {
        ForecastConfidence::Medium
    } else {
        ForecastConfidence::Low
    };

    let last_month = monthly
        .last()
        .and_then(|m| chrono::NaiveDate::parse_from_str(&m.month_label, "%Y-%m-%d").ok());
    // Months remaining to year-end, from the last known month through
    // December inclusive; fall back to the max of 6 when the label isn't a
    // parseable calendar date (e.g. in tests).
    let months_to_year_end = last_month.map(|d| (12 - d.month()) as usize).unwrap_or(6);
    let projection_count = months_to_year_end.clamp(1, 6);

    let last_index = monthly.len() as f64 - 1.0;
    let points: Vec<ForecastPoint> = (1..=projection_count)
        .map(|step| {
            let projected = (intercept + slope * (last_index + step as f64)).clamp(0.0, 100.0);
            let month_label = last_month
                .and_then(|d| d.checked_add_months(chrono::Months::new(step as u32)))
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| format!("+{step}mo"));
            ForecastPoint {
                month_label,
                projected_score: (projected * 10.0).round() / 10.0,
            }
        })
        .collect();

    Some(Forecast {
        points,
        confidence,
        note: "linear projection over available report-card history".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[f64]) -> Vec<MonthlyScore> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MonthlyScore {
                month_label: format!("m{i}"),
                score: *v,
                grade: letter_grade(*v),
            })
            .collect()
    }

    #[test]
    fn summary_detects_improving_trend_across_halves() {
        let monthly = scores(&[70.0, 71.0, 72.0, 90.0, 91.0, 92.0]);
        let summary = build_summary(&monthly).unwrap();
        assert_eq!(summary.trend, AnnualTrend::Improving);
    }

    #[test]
    fn summary_is_none_for_empty_history() {
        assert!(build_summary(&[]).is_none());
    }

    #[test]
    fn forecast_confidence_scales_with_history_length() {
        let short = build_forecast(&scores(&[80.0, 82.0, 84.0])).unwrap();
        assert_eq!(short.confidence, ForecastConfidence::Medium);
        let long = build_forecast(&scores(&[80.0; 6])).unwrap();
        assert_eq!(long.confidence, ForecastConfidence::High);
    }

    #[test]
    fn forecast_is_none_with_fewer_than_three_points() {
        assert!(build_forecast(&scores(&[80.0, 82.0])).is_none());
    }

    #[test]
    fn forecast_projects_through_year_end_from_a_parseable_month_label() {
        let monthly = vec![
            MonthlyScore { month_label: "2026-08-01".into(), score: 80.0, grade: letter_grade(80.0) },
            MonthlyScore { month_label: "2026-09-01".into(), score: 81.0, grade: letter_grade(81.0) },
            MonthlyScore { month_label: "2026-10-01".into(), score: 82.0, grade: letter_grade(82.0) },
        ];
        let forecast = build_forecast(&monthly).unwrap();
        // October through December: 2 remaining months.
        assert_eq!(forecast.points.len(), 2);
        assert_eq!(forecast.points[0].month_label, "2026-11-01");
        assert_eq!(forecast.points[1].month_label, "2026-12-01");
    }
}
