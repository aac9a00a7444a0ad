use super::{validate_common, ChartFetchContext, ChartHandler, DataPointRow};
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, ValidationResult};
use crate::query_builder::{build_where_clause, AnalyticsQuerySpec};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Handles `pie` and `doughnut`. Requires a `group_by` field; rejects
/// multi-series and period-comparison, which don't mean anything for a
/// single-snapshot distribution.
pub struct DistributionHandler;

#[async_trait]
impl ChartHandler for DistributionHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        matches!(chart_type, "pie" | "doughnut")
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        let mut result = validate_common(config);
        if config.group_by.is_none() {
            result = result.merge(ValidationResult::invalid(vec!["group_by is required".to_string()]));
        }
        if config.multiple_series || config.period_comparison {
            result = result.merge(ValidationResult::invalid(vec![
                "multiple_series and period_comparison are not supported for distribution charts".to_string(),
            ]));
        }
        result
    }

    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value> {
        let Some(group_by) = &config.group_by else {
            return Err(AppError::InvalidConfig("group_by is required".into()));
        };

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

        let sql = format!(
            "SELECT toString({group_by}) AS series_id, '' AS bucket, sum({measure}) AS value \
             FROM {table} WHERE {where_clause} GROUP BY series_id ORDER BY value DESC",
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

    async fn transform(&self, raw: &Value, config: &mut ChartConfig, _ctx: &ChartFetchContext) -> AppResult<Value> {
        let rows: Vec<DataPointRow> = serde_json::from_value(raw.clone()).unwrap_or_default();
        let total: f64 = rows.iter().map(|r| r.value).sum();
        let slices: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "label": r.series_id,
                    "value": r.value,
                    "percentage": if total > 0.0 { r.value / total * 100.0 } else { 0.0 },
                })
            })
            .collect();
        Ok(json!({
            "kind": config.chart_type,
            "slices": slices,
        }))
    }
}
