use super::{validate_common, ChartFetchContext, ChartHandler, DataPointRow};
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, DualAxisSeriesConfig, ValidationResult};
use crate::query_builder::{build_where_clause, AnalyticsQuerySpec};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Handles `dual-axis`. Requires a primary (bar, left axis) and secondary
/// (line or bar, right axis) series, fetched concurrently. Rejects
/// multi-series and period-comparison, which don't compose with a
/// two-axis layout.
pub struct DualAxisHandler;

async fn fetch_one(
    ctx: &ChartFetchContext,
    config: &ChartConfig,
    series: &DualAxisSeriesConfig,
    series_id: &str,
) -> AppResult<Vec<DataPointRow>> {
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
        measure_name: Some(series.measure_name.as_str()),
        provider_id: config.provider_id,
        filters: &filters,
    };
    let where_clause = build_where_clause(&spec);
    let sql = format!(
        "SELECT toString({date}) AS bucket, '{series_id}' AS series_id, sum({measure}) AS value \
         FROM {table} WHERE {where_clause} GROUP BY bucket ORDER BY bucket ASC",
        date = ctx.columns.date,
        measure = ctx.columns.measure,
        table = ctx.table,
    );
    with_deadline(ctx.deadline, async {
        ctx.ch
            .query(&sql)
            .fetch_all()
            .await
            .map_err(|e| AppError::StatisticsCollectionFailed(e.to_string()))
    })
    .await
}

#[async_trait]
impl ChartHandler for DualAxisHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        chart_type == "dual-axis"
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        let mut result = validate_common(config);
        match &config.dual_axis_config {
            None => {
                result = result.merge(ValidationResult::invalid(vec!["dual_axis_config is required".to_string()]));
            }
            Some(dual) => {
                if dual.primary.kind != "bar" || dual.primary.axis != "left" {
                    result = result.merge(ValidationResult::invalid(vec![
                        "primary series must be kind=bar, axis=left".to_string(),
                    ]));
                }
                if !matches!(dual.secondary.kind.as_str(), "line" | "bar") || dual.secondary.axis != "right" {
                    result = result.merge(ValidationResult::invalid(vec![
                        "secondary series must be kind in {line,bar}, axis=right".to_string(),
                    ]));
                }
            }
        }
        if config.multiple_series || config.period_comparison {
            result = result.merge(ValidationResult::invalid(vec![
                "multiple_series and period_comparison are not supported for dual-axis charts".to_string(),
            ]));
        }
        result
    }

    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value> {
        let Some(dual) = config.dual_axis_config.clone() else {
            return Err(AppError::InvalidConfig("dual_axis_config is required".into()));
        };
        let (primary, secondary) = tokio::try_join!(
            fetch_one(ctx, config, &dual.primary, "primary"),
            fetch_one(ctx, config, &dual.secondary, "secondary"),
        )?;
        let mut combined = primary;
        combined.extend(secondary);
        Ok(serde_json::to_value(combined).unwrap_or(Value::Null))
    }

    async fn transform(&self, raw: &Value, config: &mut ChartConfig, _ctx: &ChartFetchContext) -> AppResult<Value> {
        let rows: Vec<DataPointRow> = serde_json::from_value(raw.clone()).unwrap_or_default();
        let primary: Vec<Value> = rows
            .iter()
            .filter(|r| r.series_id == "primary")
            .map(|r| json!({"bucket": r.bucket, "value": r.value}))
            .collect();
        let secondary: Vec<Value> = rows
            .iter()
            .filter(|r| r.series_id == "secondary")
            .map(|r| json!({"bucket": r.bucket, "value": r.value}))
            .collect();
        let dual = config.dual_axis_config.clone();
        Ok(json!({
            "kind": "dual-axis",
            "datasets": [
                {"axis": "left", "kind": "bar", "points": primary},
                {"axis": "right", "kind": dual.as_ref().map(|d| d.secondary.kind.clone()), "points": secondary},
            ],
        }))
    }
}
