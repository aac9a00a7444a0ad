use super::{validate_common, ChartFetchContext, ChartHandler};
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, ValidationResult};
use crate::query_builder::{build_where_clause, AnalyticsQuerySpec};
use async_trait::async_trait;
use clickhouse::Row;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Row, Deserialize)]
struct MetricRow {
    value: f64,
}

/// A single aggregated number. Rejects group_by and multi-series; an
/// empty result set reports 0 rather than null.
pub struct MetricHandler;

#[async_trait]
impl ChartHandler for MetricHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        chart_type == "metric"
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        let mut result = validate_common(config);
        if config.group_by.is_some() || config.multiple_series {
            result = result.merge(ValidationResult::invalid(vec![
                "group_by and multiple_series are not supported for metric charts".to_string(),
            ]));
        }
        if let Some(agg) = &config.aggregation {
            if !matches!(agg.as_str(), "sum" | "avg" | "count" | "min" | "max") {
                result = result.merge(ValidationResult::invalid(vec![
                    "aggregation must be one of sum, avg, count, min, max".to_string(),
                ]));
            }
        }
        result
    }

    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value> {
        let practice_ids = ctx.effective_practice_ids(&config.practice_ids);
        let scope = crate::models::tenant::AccessScope {
            label: ctx.scope.label,
            practice_ids,
            provider_id: ctx.scope.provider_id,
            organization_ids: ctx.scope.organization_ids.clone(),
        };
        let filters = Vec::new();
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
        let agg = match config.aggregation.as_deref().unwrap_or("sum") {
            "avg" => "avg",
            "count" => "count",
            "min" => "min",
            "max" => "max",
            _ => "sum",
        };
        let sql = format!(
            "SELECT {agg}({measure}) AS value FROM {table} WHERE {where_clause}",
            measure = ctx.columns.measure,
            table = ctx.table,
        );
        let row = with_deadline(ctx.deadline, async {
            ctx.ch
                .query(&sql)
                .fetch_optional::<MetricRow>()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;
        Ok(json!({"value": row.map(|r| r.value).unwrap_or(0.0)}))
    }

    async fn transform(&self, raw: &Value, config: &mut ChartConfig, _ctx: &ChartFetchContext) -> AppResult<Value> {
        let value = raw.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(json!({
            "kind": "metric",
            "value": value,
            "aggregation": config.aggregation.clone().unwrap_or_else(|| "sum".to_string()),
        }))
    }
}
