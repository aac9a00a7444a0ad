use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnCatalogEntry {
    pub column_name: String,
    pub display_name: String,
    #[serde(default)]
    pub is_measure: bool,
    #[serde(default)]
    pub is_date: bool,
    #[serde(default)]
    pub is_time_period: bool,
    #[serde(default)]
    pub is_practice: bool,
    #[serde(default)]
    pub is_provider: bool,
    /// Server-side cell formatting for the table handler: `number`
    /// (default), `currency`, `percentage`, or `icon`.
    #[serde(default)]
    pub format_kind: Option<String>,
    /// Icon key rendered alongside a formatted cell when `format_kind` is
    /// `icon` (e.g. a status glyph name). Clients map this to an asset.
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    pub id: i64,
    pub logical_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub column_catalog: Vec<ColumnCatalogEntry>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDataSourceRequest {
    pub logical_name: String,
    pub schema_name: String,
    pub table_name: String,
    #[serde(default)]
    pub column_catalog: Vec<ColumnCatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDataSourceRequest {
    pub logical_name: Option<String>,
    pub column_catalog: Option<Vec<ColumnCatalogEntry>>,
    pub is_active: Option<bool>,
}

/// Physical column names resolved for the five logical roles the query
/// builder and chart handlers care about.
#[derive(Debug, Clone)]
pub struct ResolvedColumns {
    pub measure: String,
    pub date: String,
    pub time_period: String,
    pub practice: String,
    pub provider: String,
}

impl Default for ResolvedColumns {
    fn default() -> Self {
        Self {
            measure: "measure_value".into(),
            date: "date_index".into(),
            time_period: "time_period".into(),
            practice: "practice_uid".into(),
            provider: "provider_uid".into(),
        }
    }
}
