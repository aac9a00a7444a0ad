use crate::config::TrendConfig;
use crate::deadline::with_deadline_anyhow;
use crate::models::measure::MeasureConfig;
use crate::models::statistics::StatisticsRow;
use crate::models::trend::{TrendDirection, TrendPeriod, TrendResult};
use chrono::NaiveDate;
use clickhouse::Client;
use std::collections::HashMap;
use std::time::Duration;

/// Computes 3-month, 6-month, and year-over-year direction/percentage per
/// (practice, measure) from a single preloaded 13-month window, so the
/// whole analysis is in-memory after one bulk fetch.
pub struct TrendAnalyzer {
    ch: Client,
    config: TrendConfig,
    deadline: Duration,
}

impl TrendAnalyzer {
    pub fn new(ch: Client, config: TrendConfig) -> Self {
        Self::with_deadline(ch, config, Duration::from_secs(30))
    }

    pub fn with_deadline(ch: Client, config: TrendConfig, deadline: Duration) -> Self {
        Self { ch, config, deadline }
    }

    pub async fn run(
        &self,
        report_card_month: NaiveDate,
        measures: &[MeasureConfig],
    ) -> anyhow::Result<usize> {
        let higher_is_better: HashMap<&str, bool> = measures
            .iter()
            .map(|m| (m.name.as_str(), m.higher_is_better))
            .collect();
        let window_start = report_card_month - chrono::Months::new(12);
        let sql = format!(
            "SELECT practice_id, organization_id, measure_name, toString(period_date) AS period_date, value \
             FROM statistics_rows \
             WHERE period_date >= toDate('{}') AND period_date <= toDate('{}')",
            window_start.format("%Y-%m-%d"),
            report_card_month.format("%Y-%m-%d"),
        );
        let rows: Vec<StatisticsRow> =
            with_deadline_anyhow(self.deadline, async { Ok(self.ch.query(&sql).fetch_all().await?) }).await?;

        let mut by_key: HashMap<(i64, String), Vec<(NaiveDate, f64, String)>> = HashMap::new();
        for row in &rows {
            let Some(date) = row.period_naive() else { continue };
            by_key
                .entry((row.practice_id, row.measure_name.clone()))
                .or_default()
                .push((date, row.value, row.organization_id.clone()));
        }

        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut values = Vec::new();

        for ((practice_id, measure_name), mut series) in by_key {
            series.sort_by_key(|(d, _, _)| *d);
            let organization_id = series.last().map(|(_, _, org)| org.clone()).unwrap_or_default();
            let Some(&(_, current, _)) = series.iter().find(|(d, _, _)| *d == report_card_month) else {
                continue;
            };
            let hib = *higher_is_better.get(measure_name.as_str()).unwrap_or(&true);

            for (period, months_back) in [
                (TrendPeriod::ThreeMonth, 3),
                (TrendPeriod::SixMonth, 6),
                (TrendPeriod::YearOverYear, 12),
            ] {
                let comparator = if period == TrendPeriod::YearOverYear {
                    series
                        .iter()
                        .find(|(d, _, _)| *d == report_card_month - chrono::Months::new(12))
                        .map(|(_, v, _)| *v)
                } else {
                    let window_start = report_card_month - chrono::Months::new(months_back);
                    let prior: Vec<f64> = series
                        .iter()
                        .filter(|(d, _, _)| *d >= window_start && *d < report_card_month)
                        .map(|(_, v, _)| *v)
                        .collect();
                    if prior.is_empty() {
                        None
                    } else {
                        Some(prior.iter().sum::<f64>() / prior.len() as f64)
                    }
                };

                let Some(comparator) = comparator else { continue };
                let Some(result) = compute_trend(current, comparator, hib, self.config.stability_band) else {
                    continue;
                };

                let org = organization_id.replace('\'', "\\'");
                let measure = measure_name.replace('\'', "\\'");
                values.push(format!(
                    "({practice_id}, '{org}', '{measure}', '{}', '{}', {}, '{now}')",
                    period.as_str(),
                    result.direction.as_str(),
                    result.percentage_change,
                ));
            }
        }

        if values.is_empty() {
            return Ok(0);
        }

        let count = values.len();
        let sql = format!(
            "INSERT INTO trend_rows \
             (practice_id, organization_id, measure_name, period, direction, percentage_change, calculated_at) \
             VALUES {}",
            values.join(", ")
        );
        with_deadline_anyhow(self.deadline, async { Ok(self.ch.query(&sql).execute().await?) }).await?;
        Ok(count)
    }
}

/// `current` vs `comparator`, oriented by `higher_is_better`. A zero
/// comparator can't be divided by, so no trend result is produced and the
/// caller must skip writing a row for this period.
pub fn compute_trend(
    current: f64,
    comparator: f64,
    higher_is_better: bool,
    stability_band: f64,
) -> Option<TrendResult> {
    if comparator == 0.0 {
        return None;
    }

    let raw_percentage = (current - comparator) / comparator * 100.0;
    let percentage_change = raw_percentage.clamp(-99999.99, 99999.99);

    let direction = if percentage_change.abs() < stability_band {
        TrendDirection::Stable
    } else if (percentage_change > 0.0) == higher_is_better {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };

    Some(TrendResult {
        direction,
        percentage_change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
        assert!(
            (actual - expected).abs() < epsilon,
            "expected {expected}, got {actual} (diff: {})",
            (actual - expected).abs()
        );
    }

    #[test]
    fn year_over_year_improving_higher_is_better() {
        let result = compute_trend(100.0, 80.0, true, 5.0).unwrap();
        assert_eq!(result.direction, TrendDirection::Improving);
        assert_approx(result.percentage_change, 25.0, 0.01);
    }

    #[test]
    fn zero_comparator_yields_no_result() {
        assert!(compute_trend(50.0, 0.0, true, 5.0).is_none());
    }

    #[test]
    fn small_change_is_stable() {
        let result = compute_trend(102.0, 100.0, true, 5.0).unwrap();
        assert_eq!(result.direction, TrendDirection::Stable);
    }

    #[test]
    fn lower_is_better_inverts_direction() {
        // cancellation rate dropped from 10 to 7: improving for a lower-is-better measure
        let result = compute_trend(7.0, 10.0, false, 5.0).unwrap();
        assert_eq!(result.direction, TrendDirection::Improving);
    }

    #[test]
    fn percentage_change_is_clamped() {
        let result = compute_trend(1_000_000.0, 0.01, true, 5.0).unwrap();
        assert_approx(result.percentage_change, 99999.99, 0.01);
    }
}
