use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `practice_pulse.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub report_card: ReportCardConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    /// Minimum practices required in a cohort before it's considered statistically meaningful.
    #[serde(default = "default_min_bucket_size")]
    pub min_bucket_size: usize,
    /// Rolling window, in months, used to average a practice's charges.
    #[serde(default = "default_sizing_window_months")]
    pub sizing_window_months: u32,
    /// Seed thresholds (ascending) on annualized charges, before adaptive widening.
    #[serde(default = "default_thresholds")]
    pub default_thresholds: [f64; 4],
    /// Practices below this annualized-charge floor are excluded as inactive/test accounts.
    #[serde(default)]
    pub minimum_charges: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_bucket_size: default_min_bucket_size(),
            sizing_window_months: default_sizing_window_months(),
            default_thresholds: default_thresholds(),
            minimum_charges: 0.0,
        }
    }
}

fn default_min_bucket_size() -> usize {
    5
}

fn default_sizing_window_months() -> u32 {
    12
}

fn default_thresholds() -> [f64; 4] {
    [250_000.0, 750_000.0, 2_000_000.0, 5_000_000.0]
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendConfig {
    /// Percentage-change magnitude below which a trend is reported as stable.
    #[serde(default = "default_trend_stability_band")]
    pub stability_band: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            stability_band: default_trend_stability_band(),
        }
    }
}

fn default_trend_stability_band() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_score_floor")]
    pub floor: f64,
    #[serde(default = "default_score_range")]
    pub range: f64,
    #[serde(default = "default_trend_adjustment")]
    pub trend_adjustment: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            floor: default_score_floor(),
            range: default_score_range(),
            trend_adjustment: default_trend_adjustment(),
        }
    }
}

fn default_score_floor() -> f64 {
    70.0
}

fn default_score_range() -> f64 {
    30.0
}

fn default_trend_adjustment() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportCardConfig {
    /// Months of backfill a historical generation run covers by default.
    #[serde(default = "default_historical_months")]
    pub historical_months: u32,
    /// Age after which a single-practice regeneration proceeds without an explicit force flag.
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: u32,
}

impl Default for ReportCardConfig {
    fn default() -> Self {
        Self {
            historical_months: default_historical_months(),
            stale_threshold_hours: default_stale_threshold_hours(),
        }
    }
}

fn default_historical_months() -> u32 {
    24
}

fn default_stale_threshold_hours() -> u32 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Deadline applied to every outbound warehouse query; a query still
    /// running past this is aborted and reported as a timeout rather than
    /// left to run unbounded.
    #[serde(default = "default_query_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_query_deadline_ms(),
        }
    }
}

impl QueryConfig {
    pub fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.deadline_ms)
    }
}

fn default_query_deadline_ms() -> u64 {
    30_000
}

impl AnalyticsConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: AnalyticsConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}
