use super::{fetch_series, group_by_series, validate_common, ChartFetchContext, ChartHandler};
use crate::error::AppResult;
use crate::models::chart::{ChartConfig, ValidationResult};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Handles `line` and `area`. Dispatches between standard, multi-series,
/// and period-comparison transforms based on the resolved config; area is
/// line with a fill flag on the output.
pub struct TimeSeriesHandler;

#[async_trait]
impl ChartHandler for TimeSeriesHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        matches!(chart_type, "line" | "area")
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        validate_common(config)
    }

    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value> {
        let series_expr = if config.period_comparison {
            format!(
                "if({date} >= toDate('{cur}'), 'current', 'comparison')",
                date = ctx.columns.date,
                cur = config.start_date.clone().unwrap_or_default(),
            )
        } else if config.multiple_series {
            ctx.columns.practice.clone()
        } else {
            "'value'".to_string()
        };
        let rows = fetch_series(ctx, config, &series_expr).await?;
        Ok(serde_json::to_value(rows).unwrap_or(Value::Null))
    }

    async fn transform(&self, raw: &Value, config: &mut ChartConfig, _ctx: &ChartFetchContext) -> AppResult<Value> {
        let rows: Vec<super::DataPointRow> = serde_json::from_value(raw.clone()).unwrap_or_default();
        let grouped = group_by_series(&rows);
        let series: Vec<Value> = grouped
            .into_iter()
            .map(|(name, points)| {
                json!({
                    "name": name,
                    "points": points.into_iter().map(|(b, v)| json!({"bucket": b, "value": v})).collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!({
            "kind": config.chart_type,
            "fill": config.chart_type == "area",
            "series": series,
        }))
    }
}
