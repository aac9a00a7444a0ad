use super::{validate_common, ChartFetchContext, ChartHandler, DataPointRow};
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, ValidationResult};
use crate::query_builder::{build_where_clause, AnalyticsQuerySpec};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Groups rows by `group_by` (or a single "Total" bucket), aggregates
/// within each group, and computes a dynamic target as the sum of group
/// totals so each group's percentage is relative to the whole.
pub struct ProgressBarHandler;

#[async_trait]
impl ChartHandler for ProgressBarHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        chart_type == "progress-bar"
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        validate_common(config)
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
        let group_expr = config
            .group_by
            .clone()
            .unwrap_or_else(|| "'Total'".to_string());
        let sql = format!(
            "SELECT toString({group_expr}) AS series_id, '' AS bucket, sum({measure}) AS value \
             FROM {table} WHERE {where_clause} GROUP BY series_id",
            measure = ctx.columns.measure,
            table = ctx.table,
        );
        let rows: Vec<DataPointRow> = with_deadline(ctx.deadline, async {
            ctx.ch
                .query(&sql)
                .fetch_all()
                .await
                .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
        })
        .await?;
        Ok(serde_json::to_value(rows).unwrap_or(Value::Null))
    }

    async fn transform(&self, raw: &Value, _config: &mut ChartConfig, _ctx: &ChartFetchContext) -> AppResult<Value> {
        let mut rows: Vec<DataPointRow> = serde_json::from_value(raw.clone()).unwrap_or_default();
        rows.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
        let target: f64 = rows.iter().map(|r| r.value).sum();
        let groups: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "label": r.series_id,
                    "value": r.value,
                    "percentage": if target > 0.0 { r.value / target * 100.0 } else { 0.0 },
                })
            })
            .collect();
        Ok(json!({
            "kind": "progress-bar",
            "target": target,
            "groups": groups,
        }))
    }
}
