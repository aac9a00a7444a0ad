use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Number,
    Currency,
    Percentage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureConfig {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub weight: u8,
    pub higher_is_better: bool,
    pub format_kind: FormatKind,
    pub data_source_id: i64,
    pub value_column: String,
    #[serde(default)]
    pub filter_criteria: HashMap<String, String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeasureRequest {
    pub name: String,
    pub display_name: String,
    #[serde(default = "default_weight")]
    pub weight: u8,
    pub higher_is_better: bool,
    pub format_kind: FormatKind,
    pub data_source_id: i64,
    pub value_column: String,
    #[serde(default)]
    pub filter_criteria: HashMap<String, String>,
}

fn default_weight() -> u8 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMeasureRequest {
    pub display_name: Option<String>,
    pub weight: Option<u8>,
    pub higher_is_better: Option<bool>,
    pub format_kind: Option<FormatKind>,
    pub is_active: Option<bool>,
}
