use super::{fetch_series, group_by_series, validate_common, ChartFetchContext, ChartHandler};
use crate::error::AppResult;
use crate::models::chart::{ChartConfig, ValidationResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Categorical palette colors are assigned by sorted-provider-id position,
/// so the same provider set always gets the same colors run to run.
const SERIES_PALETTE: &[&str] = &[
    "#4C6EF5", "#F76707", "#2F9E44", "#E8590C", "#AE3EC9", "#1098AD", "#F08C00", "#E64980",
];

fn color_for_index(i: usize) -> &'static str {
    SERIES_PALETTE[i % SERIES_PALETTE.len()]
}

/// Handles `bar`, `stacked-bar`, `horizontal-bar`. Same series dispatch
/// as the time-series handler; when grouping by provider, fetches
/// per-provider colors in bulk (one pass over the distinct provider ids
/// in the result set) and tags each row with `series_color` before
/// transforming.
pub struct BarHandler;

#[async_trait]
impl ChartHandler for BarHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        matches!(chart_type, "bar" | "stacked-bar" | "horizontal-bar")
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        let mut result = validate_common(config);
        if config.chart_type == "stacked-bar" {
            if let Some(mode) = &config.stacking_mode {
                if mode != "normal" && mode != "percentage" {
                    result = result.merge(ValidationResult::invalid(vec![
                        "stacking_mode must be 'normal' or 'percentage'".to_string(),
                    ]));
                }
            }
        }
        result
    }

    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value> {
        let series_expr = if config.period_comparison {
            format!(
                "if({date} >= toDate('{cur}'), 'current', 'comparison')",
                date = ctx.columns.date,
                cur = config.start_date.clone().unwrap_or_default(),
            )
        } else if config.multiple_series {
            format!("toString({})", ctx.columns.provider)
        } else {
            "'value'".to_string()
        };
        let mut rows = fetch_series(ctx, config, &series_expr).await?;

        if config.multiple_series {
            // Bulk color assignment: one pass to find the distinct provider
            // ids, one pass to tag every row, rather than a per-row lookup.
            let provider_ids: BTreeSet<String> = rows.iter().map(|r| r.series_id.clone()).collect();
            let colors: std::collections::HashMap<String, &'static str> = provider_ids
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id, color_for_index(i)))
                .collect();
            for row in &mut rows {
                row.series_color = colors.get(row.series_id.as_str()).map(|c| c.to_string());
            }
        }

        Ok(serde_json::to_value(rows).unwrap_or(Value::Null))
    }

    async fn transform(&self, raw: &Value, config: &mut ChartConfig, _ctx: &ChartFetchContext) -> AppResult<Value> {
        let rows: Vec<super::DataPointRow> = serde_json::from_value(raw.clone()).unwrap_or_default();
        let colors: std::collections::HashMap<String, String> = rows
            .iter()
            .filter_map(|r| r.series_color.clone().map(|c| (r.series_id.clone(), c)))
            .collect();
        let grouped = group_by_series(&rows);
        let series: Vec<Value> = grouped
            .into_iter()
            .map(|(name, points)| {
                json!({
                    "name": name,
                    "color": colors.get(&name),
                    "bars": points.into_iter().map(|(b, v)| json!({"bucket": b, "value": v})).collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!({
            "kind": config.chart_type,
            "horizontal": config.chart_type == "horizontal-bar",
            "stacking_mode": config.stacking_mode,
            "series": series,
        }))
    }
}
