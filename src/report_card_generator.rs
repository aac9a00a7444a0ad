use crate::benchmark::BenchmarkProvider;
use crate::config::{ScoringConfig, SizingConfig};
use crate::config_db::ConfigDb;
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::measure::MeasureConfig;
use crate::models::report_card::MeasureScore;
use crate::models::statistics::StatisticsRow;
use crate::models::trend::TrendDirection;
use crate::trend_analyzer::compute_trend;
use chrono::NaiveDate;
use clickhouse::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct BucketInfo {
    bucket: String,
    organization_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct PeerDistribution {
    by_practice: HashMap<i64, f64>,
}

impl PeerDistribution {
    fn values_excluding(&self, practice_id: i64) -> Vec<f64> {
        self.by_practice
            .iter()
            .filter(|(id, _)| **id != practice_id)
            .map(|(_, v)| *v)
            .collect()
    }
}

/// Everything one generation pass needs, loaded in four bulk queries
/// instead of per-practice round trips.
struct Preload {
    size_buckets: HashMap<i64, BucketInfo>,
    month_statistics: HashMap<(i64, String), f64>,
    peer_statistics: HashMap<(String, String), PeerDistribution>,
    trend_window: HashMap<(i64, String), Vec<(NaiveDate, f64)>>,
}

/// Computes monthly weighted score snapshots, percentile rank, trend, and
/// insights from bulk-preloaded data. This is the authoritative
/// generation path; `generate_for_practice` is a thin convenience
/// wrapper over the same pipeline.
pub struct ReportCardGenerator {
    ch: Client,
    config_db: Arc<ConfigDb>,
    scoring: ScoringConfig,
    sizing: SizingConfig,
    benchmark: Arc<dyn BenchmarkProvider>,
    deadline: Duration,
}

pub struct GenerationSummary {
    pub succeeded: usize,
    pub failed: Vec<(i64, String)>,
}

impl ReportCardGenerator {
    pub fn new(
        ch: Client,
        config_db: Arc<ConfigDb>,
        scoring: ScoringConfig,
        sizing: SizingConfig,
        benchmark: Arc<dyn BenchmarkProvider>,
    ) -> Self {
        Self::with_deadline(ch, config_db, scoring, sizing, benchmark, Duration::from_secs(30))
    }

    pub fn with_deadline(
        ch: Client,
        config_db: Arc<ConfigDb>,
        scoring: ScoringConfig,
        sizing: SizingConfig,
        benchmark: Arc<dyn BenchmarkProvider>,
        deadline: Duration,
    ) -> Self {
        Self {
            ch,
            config_db,
            scoring,
            sizing,
            benchmark,
            deadline,
        }
    }

    pub async fn generate_month(&self, report_card_month: NaiveDate) -> AppResult<GenerationSummary> {
        let measures = self
            .config_db
            .list_active_measures()
            .map_err(AppError::Internal)?;
        if measures.is_empty() {
            return Err(AppError::InsufficientData("no active measures configured".into()));
        }

        let preload = self.preload(report_card_month, &measures).await?;

        let mut values = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = Vec::new();

        for (&practice_id, bucket_info) in &preload.size_buckets {
            match self.score_practice(practice_id, bucket_info, &measures, &preload) {
                Ok((overall_score, percentile_rank, insights, measure_scores)) => {
                    let org = bucket_info
                        .organization_id
                        .map(|u| u.to_string())
                        .unwrap_or_default();
                    let result_id = Uuid::new_v4().to_string();
                    let generated_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
                    let insights_json = serde_json::to_string(&insights).unwrap_or_default();
                    let scores_json = serde_json::to_string(&measure_scores).unwrap_or_default();
                    values.push(format!(
                        "('{result_id}', {practice_id}, '{}', '{}', '{generated_at}', {overall_score}, '{}', {percentile_rank}, '{}', '{}')",
                        org.replace('\'', "\\'"),
                        report_card_month.format("%Y-%m-%d"),
                        bucket_info.bucket,
                        insights_json.replace('\'', "\\'"),
                        scores_json.replace('\'', "\\'"),
                    ));
                    succeeded += 1;
                }
                Err(e) => {
                    if failed.len() < 3 {
                        failed.push((practice_id, e.to_string()));
                    }
                }
            }
        }

        if !values.is_empty() {
            let sql = format!(
                "INSERT INTO report_card_results \
                 (result_id, practice_id, organization_id, report_card_month, generated_at, overall_score, size_bucket, percentile_rank, insights, measure_scores) \
                 VALUES {}",
                values.join(", ")
            );
            with_deadline(self.deadline, async {
                self.ch
                    .query(&sql)
                    .execute()
                    .await
                    .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
            })
            .await?;
        }

        Ok(GenerationSummary { succeeded, failed })
    }

    /// Convenience wrapper for ad-hoc single-practice regeneration. Runs
    /// the same preload-then-score pipeline scoped to one practice; never
    /// called from the batch path.
    pub async fn generate_for_practice(
        &self,
        practice_id: i64,
        report_card_month: NaiveDate,
    ) -> AppResult<()> {
        let measures = self
            .config_db
            .list_active_measures()
            .map_err(AppError::Internal)?;
        let preload = self.preload_for_practices(report_card_month, &measures, &[practice_id]).await?;
        let Some(bucket_info) = preload.size_buckets.get(&practice_id) else {
            return Err(AppError::InsufficientData(format!(
                "practice {practice_id} has no size-bucket assignment"
            )));
        };
        let (overall_score, percentile_rank, insights, measure_scores) =
            self.score_practice(practice_id, bucket_info, &measures, &preload)?;

        let org = bucket_info.organization_id.map(|u| u.to_string()).unwrap_or_default();
        let result_id = Uuid::new_v4().to_string();
        let generated_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let insights_json = serde_json::to_string(&insights).unwrap_or_default();
        let scores_json = serde_json::to_string(&measure_scores).unwrap_or_default();
        let sql = format!(
            "INSERT INTO report_card_results \
             (result_id, practice_id, organization_id, report_card_month, generated_at, overall_score, size_bucket, percentile_rank, insights, measure_scores) \
             VALUES ('{result_id}', {practice_id}, '{}', '{}', '{generated_at}', {overall_score}, '{}', {percentile_rank}, '{}', '{}')",
            org.replace('\'', "\\'"),
            report_card_month.format("%Y-%m-%d"),
            bucket_info.bucket,
            insights_json.replace('\'', "\\'"),
            scores_json.replace('\'', "\\'"),
        );
        with_deadline(self.deadline, async {
            self.ch
                .query(&sql)
                .execute()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;
        Ok(())
    }

    async fn preload(&self, month: NaiveDate, measures: &[MeasureConfig]) -> AppResult<Preload> {
        self.preload_for_practices(month, measures, &[]).await
    }

    async fn preload_for_practices(
        &self,
        month: NaiveDate,
        _measures: &[MeasureConfig],
        only_practices: &[i64],
    ) -> AppResult<Preload> {
        let scope_filter = if only_practices.is_empty() {
            String::new()
        } else {
            let list = only_practices
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!(" AND practice_id IN ({list})")
        };

        let bucket_sql = format!(
            "SELECT practice_id, bucket, organization_id FROM size_bucket_assignments WHERE 1=1{scope_filter}"
        );
        #[derive(clickhouse::Row, serde::Deserialize)]
        struct BucketRow {
            practice_id: i64,
            bucket: String,
            organization_id: String,
        }
        let bucket_rows: Vec<BucketRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&bucket_sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;

        let mut size_buckets = HashMap::new();
        for row in bucket_rows {
            size_buckets.insert(
                row.practice_id,
                BucketInfo {
                    bucket: row.bucket,
                    organization_id: Uuid::parse_str(&row.organization_id).ok(),
                },
            );
        }

        let stats_sql = format!(
            "SELECT practice_id, organization_id, measure_name, toString(period_date) AS period_date, value \
             FROM statistics_rows WHERE period_date = toDate('{}'){scope_filter}",
            month.format("%Y-%m-%d")
        );
        let stats_rows: Vec<StatisticsRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&stats_sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;

        let mut month_statistics = HashMap::new();
        for row in &stats_rows {
            month_statistics.insert((row.practice_id, row.measure_name.clone()), row.value);
        }

        // Peer distribution: every practice in the same bucket, for every
        // active measure, for this month. One query regardless of
        // practice count.
        let peer_sql = format!(
            "SELECT s.practice_id AS practice_id, b.bucket AS bucket, s.measure_name AS measure_name, s.value AS value \
             FROM statistics_rows s INNER JOIN size_bucket_assignments b ON s.practice_id = b.practice_id \
             WHERE s.period_date = toDate('{}')",
            month.format("%Y-%m-%d")
        );
        #[derive(clickhouse::Row, serde::Deserialize)]
        struct PeerRow {
            practice_id: i64,
            bucket: String,
            measure_name: String,
            value: f64,
        }
        let peer_rows: Vec<PeerRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&peer_sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;

        let mut peer_statistics: HashMap<(String, String), PeerDistribution> = HashMap::new();
        for row in peer_rows {
            peer_statistics
                .entry((row.bucket, row.measure_name))
                .or_default()
                .by_practice
                .insert(row.practice_id, row.value);
        }

        let window_start = month - chrono::Months::new(3);
        let trend_sql = format!(
            "SELECT practice_id, organization_id, measure_name, toString(period_date) AS period_date, value \
             FROM statistics_rows \
             WHERE period_date >= toDate('{}') AND period_date <= toDate('{}'){scope_filter}",
            window_start.format("%Y-%m-%d"),
            month.format("%Y-%m-%d"),
        );
        let trend_rows: Vec<StatisticsRow> = with_deadline(self.deadline, async {
            self.ch
                .query(&trend_sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;

        let mut trend_window: HashMap<(i64, String), Vec<(NaiveDate, f64)>> = HashMap::new();
        for row in &trend_rows {
            if let Some(date) = row.period_naive() {
                trend_window
                    .entry((row.practice_id, row.measure_name.clone()))
                    .or_default()
                    .push((date, row.value));
            }
        }

        Ok(Preload {
            size_buckets,
            month_statistics,
            peer_statistics,
            trend_window,
        })
    }

    fn score_practice(
        &self,
        practice_id: i64,
        bucket_info: &BucketInfo,
        measures: &[MeasureConfig],
        preload: &Preload,
    ) -> anyhow::Result<(f64, f64, Vec<String>, BTreeMap<String, MeasureScore>)> {
        let mut measure_scores = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for measure in measures {
            let Some(&value) = preload.month_statistics.get(&(practice_id, measure.name.clone())) else {
                continue;
            };

            let peers = preload
                .peer_statistics
                .get(&(bucket_info.bucket.clone(), measure.name.clone()))
                .map(|d| d.values_excluding(practice_id))
                .unwrap_or_default();
            let peer_count = peers.len();

            let percentile = if peer_count >= 2 {
                let worse_count = peers
                    .iter()
                    .filter(|&&peer_value| {
                        if measure.higher_is_better {
                            peer_value < value
                        } else {
                            peer_value > value
                        }
                    })
                    .count();
                Some(worse_count as f64 / peer_count as f64 * 100.0)
            } else {
                None
            };

            let peer_average = if peer_count < self.sizing.min_bucket_size {
                self.benchmark
                    .benchmark_for(&measure.name)
                    .unwrap_or_else(|| {
                        if peers.is_empty() {
                            value
                        } else {
                            peers.iter().sum::<f64>() / peers.len() as f64
                        }
                    })
            } else {
                peers.iter().sum::<f64>() / peers.len() as f64
            };

            let window = preload
                .trend_window
                .get(&(practice_id, measure.name.clone()))
                .cloned()
                .unwrap_or_default();
            let trend = compute_measure_trend(&window, value, measure.higher_is_better, 5.0);

            let effective_percentile = percentile.unwrap_or(50.0);
            let mut score = self.scoring.floor + effective_percentile / 100.0 * self.scoring.range;
            score += match trend.0 {
                TrendDirection::Improving => self.scoring.trend_adjustment,
                TrendDirection::Declining => -self.scoring.trend_adjustment,
                TrendDirection::Stable => 0.0,
            };
            score = score.clamp(self.scoring.floor, self.scoring.floor + self.scoring.range);
            score = (score * 10.0).round() / 10.0;

            weighted_sum += score * measure.weight as f64;
            weight_total += measure.weight as f64;

            measure_scores.insert(
                measure.name.clone(),
                MeasureScore {
                    score,
                    value,
                    trend: trend.0.as_str().to_string(),
                    trend_percentage: trend.1,
                    percentile,
                    peer_average,
                    peer_count,
                },
            );
        }

        if measure_scores.is_empty() {
            anyhow::bail!("no measure produced a score for practice {practice_id}");
        }

        let overall_score = ((weighted_sum / weight_total) * 10.0).round() / 10.0;
        let percentile_rank = measure_scores
            .values()
            .filter_map(|m| m.percentile)
            .sum::<f64>()
            / measure_scores.values().filter(|m| m.percentile.is_some()).count().max(1) as f64;

        let insights = build_insights(measures, &measure_scores);

        Ok((overall_score, percentile_rank, insights, measure_scores))
    }
}

fn compute_measure_trend(
    window: &[(NaiveDate, f64)],
    current: f64,
    higher_is_better: bool,
    stability_band: f64,
) -> (TrendDirection, f64) {
    let Some(&(target_date, _)) = window.iter().max_by_key(|(d, _)| *d) else {
        return (TrendDirection::Stable, 0.0);
    };
    let prior: Vec<f64> = window
        .iter()
        .filter(|(d, _)| *d < target_date)
        .map(|(_, v)| *v)
        .collect();
    if prior.is_empty() {
        return (TrendDirection::Stable, 0.0);
    }
    let comparator = prior.iter().sum::<f64>() / prior.len() as f64;
    match compute_trend(current, comparator, higher_is_better, stability_band) {
        Some(r) => (r.direction, r.percentage_change),
        None => (TrendDirection::Stable, 0.0),
    }
}

fn build_insights(measures: &[MeasureConfig], scores: &BTreeMap<String, MeasureScore>) -> Vec<String> {
    let display_name = |name: &str| {
        measures
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| name.to_string())
    };

    let mut insights = Vec::new();

    // BTreeMap iterates in measure-name order, so ties in `.max_by`/`.min_by`
    // (which keep the first-seen candidate) resolve deterministically.
    if let Some((name, score)) = scores
        .iter()
        .max_by(|a, b| a.1.score.partial_cmp(&b.1.score).unwrap_or(std::cmp::Ordering::Equal))
    {
        if let Some(p) = score.percentile {
            insights.push(format!("{} is your top-performing measure ({}th percentile)", display_name(name), p.round() as i64));
        }
    }

    if let Some((name, score)) = scores
        .iter()
        .min_by(|a, b| a.1.score.partial_cmp(&b.1.score).unwrap_or(std::cmp::Ordering::Equal))
    {
        if score.score < 50.0 {
            insights.push(format!("{} needs attention", display_name(name)));
        }
    }

    let improving: Vec<String> = scores
        .iter()
        .filter(|(_, s)| s.trend == "improving")
        .map(|(name, _)| display_name(name))
        .collect();
    if !improving.is_empty() {
        insights.push(format!("Improving: {}", improving.join(", ")));
    }

    let declining: Vec<String> = scores
        .iter()
        .filter(|(_, s)| s.trend == "declining")
        .map(|(name, _)| display_name(name))
        .collect();
    if !declining.is_empty() {
        insights.push(format!("Declining: {}", declining.join(", ")));
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sole_bucket_member_gets_neutral_percentile() {
        let window = vec![];
        let (direction, pct) = compute_measure_trend(&window, 85.0, true, 5.0);
        assert_eq!(direction, TrendDirection::Stable);
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn trend_with_prior_window_computes_direction() {
        let window = vec![
            (NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), 70.0),
            (NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(), 72.0),
            (NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(), 71.0),
            (NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(), 90.0),
        ];
        let (direction, pct) = compute_measure_trend(&window, 90.0, true, 5.0);
        assert_eq!(direction, TrendDirection::Improving);
        assert!(pct > 5.0);
    }
}
