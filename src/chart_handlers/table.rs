use super::{validate_common, ChartFetchContext, ChartHandler};
use crate::deadline::with_deadline;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, ValidationResult};
use crate::models::data_source::ColumnCatalogEntry;
use async_trait::async_trait;
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Row, Deserialize, Serialize)]
struct TableRow {
    practice_id: i64,
    label: String,
    data: String,
}

/// Two-step fetch: first resolve column metadata (stashed on `config`),
/// then fetch row data, then apply per-column formatting. Returns an
/// empty chart-data envelope; the orchestrator pulls the real payload
/// from `config.columns` / `config.formatted_data`. Rejects aggregation,
/// multi-series, period-comparison, and group_by, none of which make
/// sense for a raw grid.
pub struct TableHandler;

#[async_trait]
impl ChartHandler for TableHandler {
    fn can_handle(&self, chart_type: &str) -> bool {
        chart_type == "table"
    }

    fn validate(&self, config: &ChartConfig) -> ValidationResult {
        let mut result = validate_common(config);
        if config.aggregation.is_some() || config.multiple_series || config.period_comparison || config.group_by.is_some() {
            result = result.merge(ValidationResult::invalid(vec![
                "aggregation, multiple_series, period_comparison, and group_by are not supported for table charts".to_string(),
            ]));
        }
        result
    }

    async fn fetch_data(&self, config: &mut ChartConfig, ctx: &ChartFetchContext) -> AppResult<Value> {
        // Real column metadata from the data source's catalog, not a
        // fabricated single entry. Fall back to the resolved measure column
        // only when the data source has no catalog entries at all.
        let value_columns: Vec<ColumnCatalogEntry> = ctx
            .column_catalog
            .iter()
            .filter(|c| c.is_measure)
            .cloned()
            .collect();
        let value_columns = if value_columns.is_empty() {
            vec![ColumnCatalogEntry {
                column_name: ctx.columns.measure.clone(),
                display_name: config.measure_name.clone().unwrap_or_else(|| ctx.columns.measure.clone()),
                is_measure: true,
                is_date: false,
                is_time_period: false,
                is_practice: false,
                is_provider: false,
                format_kind: None,
                icon: None,
            }]
        } else {
            value_columns
        };
        config.columns = Some(serde_json::to_value(&value_columns).unwrap_or(Value::Null));

        let practice_ids = ctx.effective_practice_ids(&config.practice_ids);
        let scope = crate::models::tenant::AccessScope {
            label: ctx.scope.label,
            practice_ids,
            provider_id: ctx.scope.provider_id,
            organization_ids: ctx.scope.organization_ids.clone(),
        };
        let filters = Vec::new();
        let spec = crate::query_builder::AnalyticsQuerySpec {
            table: &ctx.table,
            columns: &ctx.columns,
            scope: &scope,
            start_date: config.start_date.as_deref(),
            end_date: config.end_date.as_deref(),
            measure_name: config.measure_name.as_deref(),
            provider_id: config.provider_id,
            filters: &filters,
        };
        let where_clause = crate::query_builder::build_where_clause(&spec);

        let map_entries = value_columns
            .iter()
            .map(|c| format!("'{0}', toString({0})", c.column_name))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT {practice} AS practice_id, toString({practice}) AS label, \
             toJSONString(map({map_entries})) AS data \
             FROM {table} WHERE {where_clause} LIMIT 1000",
            practice = ctx.columns.practice,
            table = ctx.table,
        );

        let rows: Vec<TableRow> = with_deadline(ctx.deadline, async {
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
        let rows: Vec<TableRow> = serde_json::from_value(raw.clone()).unwrap_or_default();
        let columns: Vec<ColumnCatalogEntry> = config
            .columns
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let formatted: Vec<Value> = rows
            .iter()
            .map(|row| {
                let data: Value = serde_json::from_str(&row.data).unwrap_or(json!({}));
                let mut cells = serde_json::Map::new();
                for column in &columns {
                    let raw_value = data
                        .get(&column.column_name)
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<f64>().ok())
                        .unwrap_or(0.0);
                    let formatted_value = format_cell(raw_value, column.format_kind.as_deref());
                    let mut cell = json!({
                        "formatted": formatted_value,
                        "raw": raw_value,
                    });
                    if let Some(icon) = &column.icon {
                        cell["icon"] = json!(icon);
                    }
                    cells.insert(column.column_name.clone(), cell);
                }
                json!({
                    "practice_id": row.practice_id,
                    "label": row.label,
                    "cells": Value::Object(cells),
                })
            })
            .collect();

        config.formatted_data = Some(Value::Array(formatted));
        Ok(json!({"kind": "table"}))
    }
}

fn format_cell(raw_value: f64, format_kind: Option<&str>) -> String {
    match format_kind {
        Some("currency") => format!("${raw_value:.2}"),
        Some("percentage") => format!("{raw_value:.1}%"),
        _ => format!("{raw_value}"),
    }
}
