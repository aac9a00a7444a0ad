use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartDefinition {
    pub id: i64,
    pub chart_type: String,
    pub data_source_id: i64,
    pub chart_config: Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChartDefinitionRequest {
    pub chart_type: String,
    pub data_source_id: i64,
    #[serde(default = "default_empty_object")]
    pub chart_config: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateChartDefinitionRequest {
    pub chart_type: Option<String>,
    pub chart_config: Option<Value>,
    pub is_active: Option<bool>,
}

pub fn default_empty_object() -> Value {
    serde_json::json!({})
}

/// Per-request overrides merged over a resolved chart definition's config.
/// Runtime values win over the definition's stored defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub preset: Option<String>,
    pub practice_ids: Option<Vec<i64>>,
    pub provider_id: Option<i64>,
    pub measure_name: Option<String>,
    pub frequency: Option<String>,
}

/// The mutable config object threaded through a handler's
/// validate/fetch/transform pipeline. Free-form beyond the fields every
/// handler looks at; handler-specific keys live under `extra`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    pub chart_type: String,
    pub data_source_id: i64,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub practice_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub measure_name: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub multiple_series: bool,
    #[serde(default)]
    pub period_comparison: bool,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default)]
    pub stacking_mode: Option<String>,
    #[serde(default)]
    pub dual_axis_config: Option<DualAxisConfig>,
    /// Side channel populated by the table handler during `fetch_data`,
    /// surfaced by the orchestrator instead of riding in `chart_data`.
    #[serde(default)]
    pub columns: Option<Value>,
    #[serde(default)]
    pub formatted_data: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DualAxisSeriesConfig {
    pub measure_name: String,
    pub kind: String,
    pub axis: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DualAxisConfig {
    pub primary: DualAxisSeriesConfig,
    pub secondary: DualAxisSeriesConfig,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    pub fn merge(mut self, other: ValidationResult) -> Self {
        if !other.is_valid {
            self.is_valid = false;
            self.errors.extend(other.errors);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationMetadata {
    pub chart_type: String,
    pub data_source_id: i64,
    pub query_time_ms: u128,
    pub cache_hit: bool,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub chart_data: Value,
    pub raw_rows: Value,
    pub columns: Option<Value>,
    pub formatted_data: Option<Value>,
    pub metadata: OrchestrationMetadata,
}
