use crate::config::SizingConfig;
use crate::deadline::with_deadline_anyhow;
use crate::models::sizing::{AdaptiveThresholds, SizeBucket};
use clickhouse::{Client, Row};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Row, Deserialize)]
struct ChargesRow {
    practice_id: i64,
    organization_id: String,
    annualized_charges: f64,
}

/// Assigns every sufficiently-active practice to a size cohort. A single
/// instance owns the effective thresholds from its last run so that
/// "why is practice P in bucket B" explanations stay consistent between
/// runs; concurrent runs are disallowed by the lease in `run`.
pub struct SizingEngine {
    ch: Client,
    config: SizingConfig,
    deadline: Duration,
    lease: tokio::sync::Mutex<()>,
    last_thresholds: std::sync::Mutex<Option<AdaptiveThresholds>>,
}

impl SizingEngine {
    pub fn new(ch: Client, config: SizingConfig) -> Self {
        Self::with_deadline(ch, config, Duration::from_secs(30))
    }

    pub fn with_deadline(ch: Client, config: SizingConfig, deadline: Duration) -> Self {
        Self {
            ch,
            config,
            deadline,
            lease: tokio::sync::Mutex::new(()),
            last_thresholds: std::sync::Mutex::new(None),
        }
    }

    pub fn effective_thresholds(&self) -> Option<AdaptiveThresholds> {
        *self.last_thresholds.lock().unwrap()
    }

    pub async fn run(&self) -> anyhow::Result<usize> {
        let _guard = self.lease.lock().await;

        let sql = format!(
            "SELECT practice_id, any(organization_id) AS organization_id, \
             sum(value) / {months}.0 * 12.0 AS annualized_charges \
             FROM statistics_rows \
             WHERE measure_name = 'total_charges' \
               AND period_date >= subtractMonths(toStartOfMonth(now()), {months}) \
             GROUP BY practice_id",
            months = self.config.sizing_window_months
        );

        let mut rows: Vec<ChargesRow> =
            with_deadline_anyhow(self.deadline, async { Ok(self.ch.query(&sql).fetch_all().await?) }).await?;
        rows.retain(|r| r.annualized_charges >= self.config.minimum_charges);
        rows.sort_by(|a, b| {
            a.annualized_charges
                .partial_cmp(&b.annualized_charges)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let sorted_charges: Vec<f64> = rows.iter().map(|r| r.annualized_charges).collect();
        let thresholds = compute_adaptive_thresholds(
            &sorted_charges,
            self.config.default_thresholds,
            self.config.min_bucket_size,
        );
        *self.last_thresholds.lock().unwrap() = Some(thresholds);

        let n = rows.len();
        if n == 0 {
            return Ok(0);
        }

        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut values = Vec::with_capacity(n);
        for (rank, row) in rows.iter().enumerate() {
            let bucket = assign_bucket(row.annualized_charges, &thresholds);
            let percentile = (rank + 1) as f64 / n as f64 * 100.0;
            let org = row.organization_id.replace('\'', "\\'");
            values.push(format!(
                "({}, '{}', '{}', {}, {}, '{}')",
                row.practice_id,
                org,
                bucket.as_str(),
                row.annualized_charges,
                percentile,
                now
            ));
        }

        let sql = format!(
            "INSERT INTO size_bucket_assignments \
             (practice_id, organization_id, bucket, monthly_charges_avg, percentile_in_global_distribution, calculated_at) \
             VALUES {}",
            values.join(", ")
        );
        with_deadline_anyhow(self.deadline, async { Ok(self.ch.query(&sql).execute().await?) }).await?;

        Ok(n)
    }
}

/// Pure, deterministic: `(sorted ascending charges, seed thresholds,
/// minimum cohort size) -> adjusted thresholds`. Widens the top cohort
/// first, then the bottom, then (only if supply allows) the interior
/// boundaries. Never crosses an adjacent boundary, never shrinks a
/// cohort that already meets the minimum.
pub fn compute_adaptive_thresholds(
    sorted_charges: &[f64],
    defaults: [f64; 4],
    min_size: usize,
) -> AdaptiveThresholds {
    let [mut small_max, mut medium_max, mut large_max, mut xlarge_max] = defaults;
    let n = sorted_charges.len();
    if n == 0 || min_size == 0 {
        return AdaptiveThresholds {
            small_max,
            medium_max,
            large_max,
            xlarge_max,
        };
    }

    let count_above = |threshold: f64| sorted_charges.iter().filter(|&&v| v > threshold).count();
    let count_at_or_below = |threshold: f64| sorted_charges.iter().filter(|&&v| v <= threshold).count();

    // Widen the top cohort (xxlarge = above xlarge_max) if undersized.
    if count_above(xlarge_max) < min_size && n >= min_size {
        let idx_from_top = n.saturating_sub(min_size);
        let new_boundary_value = sorted_charges[idx_from_top];
        let candidate = new_boundary_value - 1.0;
        if candidate > large_max {
            xlarge_max = candidate;
        }
    }

    // Widen the bottom cohort (small = at/below small_max) if undersized.
    if count_at_or_below(small_max) < min_size && n >= min_size {
        let idx_from_bottom = min_size.saturating_sub(1).min(n - 1);
        let new_boundary_value = sorted_charges[idx_from_bottom];
        let candidate = new_boundary_value + 1.0;
        if candidate < medium_max {
            small_max = candidate;
        }
    }

    // Interior cohorts only adjust if they remain undersized and there's
    // adjacent supply to pull from without crossing a neighbor.
    let medium_count = sorted_charges
        .iter()
        .filter(|&&v| v > small_max && v <= medium_max)
        .count();
    if medium_count < min_size && n >= min_size {
        let candidate_idx = sorted_charges
            .iter()
            .position(|&v| v > small_max)
            .map(|start| start + min_size.saturating_sub(1))
            .filter(|&idx| idx < n);
        if let Some(idx) = candidate_idx {
            let candidate = sorted_charges[idx] + 1.0;
            if candidate < large_max {
                medium_max = candidate;
            }
        }
    }

    let large_count = sorted_charges
        .iter()
        .filter(|&&v| v > medium_max && v <= large_max)
        .count();
    if large_count < min_size && n >= min_size {
        let candidate_idx = sorted_charges
            .iter()
            .position(|&v| v > medium_max)
            .map(|start| start + min_size.saturating_sub(1))
            .filter(|&idx| idx < n);
        if let Some(idx) = candidate_idx {
            let candidate = sorted_charges[idx] + 1.0;
            if candidate < xlarge_max {
                large_max = candidate;
            }
        }
    }

    AdaptiveThresholds {
        small_max,
        medium_max,
        large_max,
        xlarge_max,
    }
}

pub fn assign_bucket(charges: f64, thresholds: &AdaptiveThresholds) -> SizeBucket {
    if charges <= thresholds.small_max {
        SizeBucket::Small
    } else if charges <= thresholds.medium_max {
        SizeBucket::Medium
    } else if charges <= thresholds.large_max {
        SizeBucket::Large
    } else if charges <= thresholds.xlarge_max {
        SizeBucket::Xlarge
    } else {
        SizeBucket::Xxlarge
    }
}

/// Drive the sizing engine on a fixed interval, outside the request path.
pub fn spawn_sizing_engine(engine: std::sync::Arc<SizingEngine>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match engine.run().await {
                Ok(n) => tracing::info!("sizing engine: assigned {n} practices"),
                Err(e) => tracing::error!("sizing engine error: {e}"),
            }
        }
    });
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
    fn undersized_top_cohort_gets_widened() {
        // 50 practices, default thresholds put only 2 above xlarge_max.
        let mut charges: Vec<f64> = (1..=48).map(|i| i as f64 * 10_000.0).collect();
        charges.push(6_000_000.0);
        charges.push(7_000_000.0);
        charges.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let defaults = [250_000.0, 750_000.0, 2_000_000.0, 5_000_000.0];
        let thresholds = compute_adaptive_thresholds(&charges, defaults, 5);
        let xxlarge_count = charges.iter().filter(|&&v| v > thresholds.xlarge_max).count();
        assert!(xxlarge_count >= 5, "expected widened xxlarge cohort, got {xxlarge_count}");
    }

    #[test]
    fn sufficient_cohorts_are_left_untouched() {
        let charges: Vec<f64> = (1..=100).map(|i| i as f64 * 100_000.0).collect();
        let defaults = [250_000.0, 750_000.0, 2_000_000.0, 5_000_000.0];
        let thresholds = compute_adaptive_thresholds(&charges, defaults, 5);
        assert_eq!(thresholds.small_max, defaults[0]);
    }

    #[test]
    fn empty_input_returns_defaults() {
        let defaults = [250_000.0, 750_000.0, 2_000_000.0, 5_000_000.0];
        let thresholds = compute_adaptive_thresholds(&[], defaults, 5);
        assert_approx(thresholds.small_max, defaults[0], 0.001);
    }

    #[test]
    fn assign_bucket_respects_boundaries() {
        let thresholds = AdaptiveThresholds {
            small_max: 100.0,
            medium_max: 200.0,
            large_max: 300.0,
            xlarge_max: 400.0,
        };
        assert_eq!(assign_bucket(50.0, &thresholds), SizeBucket::Small);
        assert_eq!(assign_bucket(100.0, &thresholds), SizeBucket::Small);
        assert_eq!(assign_bucket(150.0, &thresholds), SizeBucket::Medium);
        assert_eq!(assign_bucket(500.0, &thresholds), SizeBucket::Xxlarge);
    }
}
