mod bar;
mod distribution;
mod dual_axis;
mod metric;
mod progress_bar;
mod table;
mod time_series;

use crate::audit::AuditTracker;
use crate::cache::ChartCache;
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::chart::ChartConfig;
use crate::models::chart::ValidationResult;
use crate::models::data_source::{ColumnCatalogEntry, ResolvedColumns};
use crate::models::tenant::AccessScope;
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Everything a handler needs to fetch and transform data for one
/// request: the warehouse client, the resolved column names for the
/// request's data source, the caller's access scope (already
/// RBAC-resolved), and a shared cache handle for sub-fetches (e.g. the
/// table handler's column-metadata step).
pub struct ChartFetchContext {
    pub ch: Client,
    pub table: String,
    pub columns: ResolvedColumns,
    pub column_catalog: Vec<ColumnCatalogEntry>,
    pub scope: AccessScope,
    pub cache: Option<ChartCache>,
    pub audit: AuditTracker,
    pub deadline: Duration,
}

impl ChartFetchContext {
    /// Resolves the effective practice filter, substituting the
    /// fail-closed sentinel and emitting a high-severity audit event
    /// whenever the caller's own config supplies an empty list under a
    /// restricted scope.
    pub fn effective_practice_ids(&self, requested: &Option<Vec<i64>>) -> Option<Vec<i64>> {
        match (&self.scope.practice_ids, requested) {
            (None, Some(ids)) => Some(ids.clone()),
            (None, None) => None,
            (Some(scoped), Some(ids)) => {
                let intersection: Vec<i64> = ids.iter().filter(|id| scoped.contains(id)).copied().collect();
                if intersection.is_empty() {
                    self.audit.fail_closed(
                        "chart_handler",
                        "requested practice_ids do not intersect the caller's accessible scope",
                    );
                    Some(vec![crate::models::tenant::SENTINEL_PRACTICE_ID])
                } else {
                    Some(intersection)
                }
            }
            (Some(scoped), None) if scoped.is_empty() => {
                self.audit.fail_closed(
                    "chart_handler",
                    "empty practice_ids under a restricted scope",
                );
                Some(vec![crate::models::tenant::SENTINEL_PRACTICE_ID])
            }
            (Some(scoped), None) => Some(scoped.clone()),
        }
    }
}

#[async_trait]
pub trait ChartHandler: Send + Sync {
    fn can_handle(&self, chart_type: &str) -> bool;
    fn validate(&self, config: &ChartConfig) -> ValidationResult;
    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value>;
    async fn transform(&self, raw: &Value, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value>;
}

/// Fields every handler's validation shares: a chart type and a positive
/// data source id.
pub fn validate_common(config: &ChartConfig) -> ValidationResult {
    let mut errors = Vec::new();
    if config.chart_type.trim().is_empty() {
        errors.push("chart_type is required".to_string());
    }
    if config.data_source_id <= 0 {
        errors.push("data_source_id must be positive".to_string());
    }
    if errors.is_empty() {
        ValidationResult::ok()
    } else {
        ValidationResult::invalid(errors)
    }
}

#[derive(Debug, Clone, Row, Deserialize, Serialize)]
pub struct DataPointRow {
    pub bucket: String,
    pub series_id: String,
    pub value: f64,
    /// Bulk-assigned per-provider display color, set by the bar handler
    /// before transformation when grouping by provider. Absent otherwise.
    #[serde(default)]
    pub series_color: Option<String>,
}

/// Shared fetch used by time-series, bar, and metric handlers: one
/// measure, grouped into named series (current/comparison, or a single
/// "value" series when neither multi-series nor period-comparison is
/// requested).
pub async fn fetch_series(
    ctx: &ChartFetchContext,
    config: &ChartConfig,
    series_expr: &str,
) -> AppResult<Vec<DataPointRow>> {
    use crate::models::chart::Filter;
    use crate::query_builder::{build_where_clause, AnalyticsQuerySpec};

    let practice_ids = ctx.effective_practice_ids(&config.practice_ids);
    let scope = AccessScope {
        label: ctx.scope.label,
        practice_ids,
        provider_id: ctx.scope.provider_id,
        organization_ids: ctx.scope.organization_ids.clone(),
    };
    let filters: Vec<Filter> = Vec::new();
    let spec = AnalyticsQuerySpec {
        table: &ctx.table,
        columns: &ctx.columns,
        scope: &scope,
        start_date: config.start_date.as_deref(),
        end_date: config.end_date.as_deref(),
        measure_name: config.measure_name.as_deref(),
        provider_id: config.provider_id,
        filters: &filters,
    };
    let where_clause = build_where_clause(&spec);

    let sql = format!(
        "SELECT toString({date_col}) AS bucket, {series_expr} AS series_id, sum({measure_col}) AS value \
         FROM {table} WHERE {where_clause} GROUP BY bucket, series_id ORDER BY bucket ASC",
        date_col = ctx.columns.date,
        measure_col = ctx.columns.measure,
        table = ctx.table,
    );

    with_deadline(ctx.deadline, async {
        ctx.ch
            .query(&sql)
            .fetch_all::<DataPointRow>()
            .await
            .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
    })
    .await
}

pub fn group_by_series(rows: &[DataPointRow]) -> HashMap<String, Vec<(&str, f64)>> {
    let mut grouped: HashMap<String, Vec<(&str, f64)>> = HashMap::new();
    for row in rows {
        grouped.entry(row.series_id.clone()).or_default().push((row.bucket.as_str(), row.value));
    }
    grouped
}

/// Two-step lookup: exact key, then a linear `can_handle` scan so one
/// handler can claim several chart-type variants. Duplicate registration
/// overwrites with a warning.
#[derive(Clone)]
pub struct ChartHandlerRegistry {
    by_key: HashMap<String, std::sync::Arc<dyn ChartHandler>>,
}

impl ChartHandlerRegistry {
    pub fn new() -> Self {
        Self { by_key: HashMap::new() }
    }

    pub fn register(&mut self, key: &str, handler: std::sync::Arc<dyn ChartHandler>) {
        if self.by_key.contains_key(key) {
            tracing::warn!("chart handler for '{key}' overwritten");
        }
        self.by_key.insert(key.to_string(), handler);
    }

    pub fn lookup(&self, chart_type: &str) -> Option<std::sync::Arc<dyn ChartHandler>> {
        if let Some(h) = self.by_key.get(chart_type) {
            return Some(h.clone());
        }
        self.by_key.values().find(|h| h.can_handle(chart_type)).cloned()
    }

    pub fn available_kinds(&self) -> Vec<String> {
        self.by_key.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
    }

    /// Populates the registry with all built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("line", std::sync::Arc::new(time_series::TimeSeriesHandler));
        registry.register("area", std::sync::Arc::new(time_series::TimeSeriesHandler));
        registry.register("bar", std::sync::Arc::new(bar::BarHandler));
        registry.register("stacked-bar", std::sync::Arc::new(bar::BarHandler));
        registry.register("horizontal-bar", std::sync::Arc::new(bar::BarHandler));
        registry.register("pie", std::sync::Arc::new(distribution::DistributionHandler));
        registry.register("doughnut", std::sync::Arc::new(distribution::DistributionHandler));
        registry.register("dual-axis", std::sync::Arc::new(dual_axis::DualAxisHandler));
        registry.register("metric", std::sync::Arc::new(metric::MetricHandler));
        registry.register("progress-bar", std::sync::Arc::new(progress_bar::ProgressBarHandler));
        registry.register("table", std::sync::Arc::new(table::TableHandler));
        registry
    }
}

impl Default for ChartHandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_key_lookup_wins_over_can_handle_scan() {
        let registry = ChartHandlerRegistry::with_defaults();
        assert!(registry.lookup("line").is_some());
        assert!(registry.lookup("stacked-bar").is_some());
    }

    #[test]
    fn unknown_kind_returns_none() {
        let registry = ChartHandlerRegistry::with_defaults();
        assert!(registry.lookup("scatter-3d").is_none());
    }

    #[test]
    fn clear_empties_the_registry() {
        let mut registry = ChartHandlerRegistry::with_defaults();
        registry.clear();
        assert!(registry.lookup("line").is_none());
    }
}
