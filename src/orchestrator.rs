use crate::access::AccessScopeResolver;
use crate::audit::AuditTracker;
use crate::cache::ChartCache;
use crate::chart_handlers::{ChartFetchContext, ChartHandlerRegistry};
use crate::column_resolver::ColumnResolver;
use crate::config_db::ConfigDb;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, OrchestrationMetadata, OrchestrationResult, RuntimeFilters};
use crate::models::tenant::TenantIdentity;
use clickhouse::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ties the access resolver, column resolver, handler registry, and
/// cache together into the single path every chart request goes
/// through. A chart can be requested two ways: by a stored
/// `chart_definition_id`, or by an inline `ChartConfig` (the "explore"
/// path used by ad-hoc queries); both converge here.
pub struct ChartOrchestrator {
    ch: Client,
    config_db: Arc<ConfigDb>,
    access: AccessScopeResolver,
    registry: ChartHandlerRegistry,
    cache: Option<ChartCache>,
    audit: AuditTracker,
    deadline: Duration,
}

impl ChartOrchestrator {
    pub fn new(
        ch: Client,
        config_db: Arc<ConfigDb>,
        audit: AuditTracker,
        cache: Option<ChartCache>,
    ) -> Self {
        Self::with_deadline(ch, config_db, audit, cache, Duration::from_secs(30))
    }

    pub fn with_deadline(
        ch: Client,
        config_db: Arc<ConfigDb>,
        audit: AuditTracker,
        cache: Option<ChartCache>,
        deadline: Duration,
    ) -> Self {
        Self {
            ch,
            config_db,
            access: AccessScopeResolver::new(audit.clone()),
            registry: ChartHandlerRegistry::with_defaults(),
            cache,
            audit,
            deadline,
        }
    }

    /// Resolves a chart by its stored definition id, applying `overrides`
    /// (runtime filters) on top of the definition's stored config.
    pub async fn orchestrate_by_definition(
        &self,
        identity: &TenantIdentity,
        definition_id: i64,
        overrides: RuntimeFilters,
    ) -> AppResult<OrchestrationResult> {
        let definition = self
            .config_db
            .get_chart_definition(definition_id)?
            .ok_or(AppError::ChartDefinitionNotFound(definition_id))?;
        if !definition.is_active {
            return Err(AppError::ChartDefinitionNotFound(definition_id));
        }
        let mut config: ChartConfig = serde_json::from_value(definition.chart_config)
            .map_err(|e| AppError::InvalidConfig(e.to_string()))?;
        config.chart_type = definition.chart_type;
        config.data_source_id = definition.data_source_id;
        apply_overrides(&mut config, overrides);
        self.orchestrate(identity, config).await
    }

    /// Resolves an inline, ad-hoc chart config directly.
    pub async fn orchestrate_inline(
        &self,
        identity: &TenantIdentity,
        mut config: ChartConfig,
        overrides: RuntimeFilters,
    ) -> AppResult<OrchestrationResult> {
        apply_overrides(&mut config, overrides);
        self.orchestrate(identity, config).await
    }

    async fn orchestrate(
        &self,
        identity: &TenantIdentity,
        mut config: ChartConfig,
    ) -> AppResult<OrchestrationResult> {
        // Defense in depth: re-resolve access scope independently of
        // whatever scope a caller of this method might already hold, and
        // re-check the data source is reachable before touching the
        // warehouse.
        let scope = self.access.resolve(identity);
        let data_source = self
            .config_db
            .get_data_source(config.data_source_id)?
            .filter(|d| d.is_active)
            .ok_or(AppError::DataSourceNotFound(config.data_source_id))?;

        let handler = self.registry.lookup(&config.chart_type).ok_or_else(|| {
            AppError::NoHandlerForChartType(format!(
                "{} (available: {})",
                config.chart_type,
                self.registry.available_kinds().join(", ")
            ))
        })?;

        let validation = handler.validate(&config);
        if !validation.is_valid {
            return Err(AppError::InvalidConfig(validation.errors.join("; ")));
        }

        let columns = ColumnResolver::resolve(Some(&data_source));
        let table = format!("{}.{}", data_source.schema_name, data_source.table_name);
        let cache_key = format!(
            "ds:{}:chart:{}:{}",
            config.data_source_id,
            config.chart_type,
            serde_json::to_string(&config).unwrap_or_default()
        );

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key).await {
                return Ok(OrchestrationResult {
                    chart_data: (*cached).clone(),
                    raw_rows: serde_json::Value::Null,
                    columns: config.columns.clone(),
                    formatted_data: config.formatted_data.clone(),
                    metadata: OrchestrationMetadata {
                        chart_type: config.chart_type.clone(),
                        data_source_id: config.data_source_id,
                        query_time_ms: 0,
                        cache_hit: true,
                        record_count: 0,
                    },
                });
            }
        }

        let ctx = ChartFetchContext {
            ch: self.ch.clone(),
            table,
            columns,
            column_catalog: data_source.column_catalog.clone(),
            scope,
            cache: self.cache.clone(),
            audit: self.audit.clone(),
            deadline: self.deadline,
        };

        // query-time only spans the fetch phase, not resolution/validation.
        let started = Instant::now();
        let raw = handler.fetch_data(&mut config, &ctx).await?;
        let query_time_ms = started.elapsed().as_millis();
        let record_count = raw.as_array().map(|a| a.len()).unwrap_or(0);
        let chart_data = handler.transform(&raw, &mut config, &ctx).await?;

        if let Some(cache) = &self.cache {
            cache.put(cache_key, chart_data.clone()).await;
        }

        Ok(OrchestrationResult {
            chart_data,
            raw_rows: raw,
            columns: config.columns,
            formatted_data: config.formatted_data,
            metadata: OrchestrationMetadata {
                chart_type: config.chart_type,
                data_source_id: config.data_source_id,
                query_time_ms,
                cache_hit: false,
                record_count,
            },
        })
    }
}

/// Runtime filters always win over a stored definition's or inline
/// config's own values.
fn apply_overrides(config: &mut ChartConfig, overrides: RuntimeFilters) {
    if overrides.start_date.is_some() {
        config.start_date = overrides.start_date;
    }
    if overrides.end_date.is_some() {
        config.end_date = overrides.end_date;
    }
    if overrides.practice_ids.is_some() {
        config.practice_ids = overrides.practice_ids;
    }
    if overrides.provider_id.is_some() {
        config.provider_id = overrides.provider_id;
    }
    if overrides.measure_name.is_some() {
        config.measure_name = overrides.measure_name;
    }
    if overrides.frequency.is_some() {
        config.frequency = overrides.frequency;
    }
    if let Some(preset) = overrides.preset {
        config.preset = Some(preset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_existing_config_values() {
        let mut config = ChartConfig {
            chart_type: "line".into(),
            data_source_id: 1,
            start_date: Some("2026-01-01".into()),
            end_date: None,
            preset: None,
            practice_ids: None,
            provider_id: None,
            measure_name: None,
            frequency: None,
            multiple_series: false,
            period_comparison: false,
            group_by: None,
            aggregation: None,
            stacking_mode: None,
            dual_axis_config: None,
            columns: None,
            formatted_data: None,
            extra: serde_json::Map::new(),
        };
        apply_overrides(
            &mut config,
            RuntimeFilters {
                start_date: Some("2026-02-01".into()),
                practice_ids: Some(vec![5]),
                ..Default::default()
            },
        );
        assert_eq!(config.start_date, Some("2026-02-01".into()));
        assert_eq!(config.practice_ids, Some(vec![5]));
    }

    #[test]
    fn unset_overrides_leave_existing_values_untouched() {
        let mut config = ChartConfig {
            chart_type: "line".into(),
            data_source_id: 1,
            start_date: Some("2026-01-01".into()),
            end_date: None,
            preset: None,
            practice_ids: Some(vec![1, 2]),
            provider_id: None,
            measure_name: None,
            frequency: None,
            multiple_series: false,
            period_comparison: false,
            group_by: None,
            aggregation: None,
            stacking_mode: None,
            dual_axis_config: None,
            columns: None,
            formatted_data: None,
            extra: serde_json::Map::new(),
        };
        apply_overrides(&mut config, RuntimeFilters::default());
        assert_eq!(config.start_date, Some("2026-01-01".into()));
        assert_eq!(config.practice_ids, Some(vec![1, 2]));
    }
}
