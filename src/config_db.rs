use crate::models::chart::ChartDefinition;
use crate::models::data_source::{ColumnCatalogEntry, DataSourceDescriptor};
use crate::models::measure::MeasureConfig;
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// rusqlite-backed control-plane store for data source descriptors,
/// measure configs, and chart definitions. The warehouse itself
/// (ClickHouse) only ever holds rows; the shapes that describe how to
/// query it live here.
pub struct ConfigDb {
    conn: Mutex<Connection>,
}

impl ConfigDb {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS data_sources (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                logical_name  TEXT NOT NULL UNIQUE,
                schema_name   TEXT NOT NULL,
                table_name    TEXT NOT NULL,
                column_catalog TEXT NOT NULL DEFAULT '[]',
                is_active     INTEGER NOT NULL DEFAULT 1,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS measures (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                name              TEXT NOT NULL UNIQUE,
                display_name      TEXT NOT NULL,
                data_source_id    INTEGER NOT NULL REFERENCES data_sources(id) ON DELETE CASCADE,
                higher_is_better  INTEGER NOT NULL DEFAULT 1,
                weight            INTEGER NOT NULL DEFAULT 5,
                format_kind       TEXT NOT NULL DEFAULT 'number',
                value_column      TEXT NOT NULL,
                filter_criteria   TEXT NOT NULL DEFAULT '{}',
                is_active         INTEGER NOT NULL DEFAULT 1,
                created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_measures_data_source ON measures(data_source_id);

            CREATE TABLE IF NOT EXISTS chart_definitions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                chart_type      TEXT NOT NULL,
                data_source_id  INTEGER NOT NULL REFERENCES data_sources(id) ON DELETE CASCADE,
                chart_config    TEXT NOT NULL DEFAULT '{}',
                is_active       INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_chart_definitions_data_source ON chart_definitions(data_source_id);
            ",
        )?;

        Ok(())
    }

    // ── Data source operations ──

    pub fn list_data_sources(&self) -> anyhow::Result<Vec<DataSourceDescriptor>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, logical_name, schema_name, table_name, column_catalog, is_active \
             FROM data_sources ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_data_source)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_data_source(&self, id: i64) -> anyhow::Result<Option<DataSourceDescriptor>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, logical_name, schema_name, table_name, column_catalog, is_active \
             FROM data_sources WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::row_to_data_source)?;
        Ok(rows.next().transpose()?)
    }

    fn row_to_data_source(row: &rusqlite::Row) -> rusqlite::Result<DataSourceDescriptor> {
        let catalog_json: String = row.get(4)?;
        let column_catalog: Vec<ColumnCatalogEntry> = serde_json::from_str(&catalog_json).unwrap_or_default();
        Ok(DataSourceDescriptor {
            id: row.get(0)?,
            logical_name: row.get(1)?,
            schema_name: row.get(2)?,
            table_name: row.get(3)?,
            column_catalog,
            is_active: row.get(5)?,
        })
    }

    pub fn create_data_source(
        &self,
        logical_name: &str,
        schema_name: &str,
        table_name: &str,
        column_catalog: &[ColumnCatalogEntry],
    ) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let catalog_json = serde_json::to_string(column_catalog)?;
        conn.execute(
            "INSERT INTO data_sources (logical_name, schema_name, table_name, column_catalog) \
             VALUES (?1, ?2, ?3, ?4)",
            params![logical_name, schema_name, table_name, catalog_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_data_source(
        &self,
        id: i64,
        logical_name: Option<&str>,
        column_catalog: Option<&[ColumnCatalogEntry]>,
        is_active: Option<bool>,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let existing = {
            let mut stmt = conn.prepare(
                "SELECT id, logical_name, schema_name, table_name, column_catalog, is_active \
                 FROM data_sources WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], Self::row_to_data_source)?;
            match rows.next().transpose()? {
                Some(d) => d,
                None => return Ok(false),
            }
        };
        let new_name = logical_name.unwrap_or(&existing.logical_name);
        let new_catalog = column_catalog.unwrap_or(&existing.column_catalog);
        let new_active = is_active.unwrap_or(existing.is_active);
        let catalog_json = serde_json::to_string(new_catalog)?;
        let count = conn.execute(
            "UPDATE data_sources SET logical_name = ?2, column_catalog = ?3, is_active = ?4, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
            params![id, new_name, catalog_json, new_active],
        )?;
        Ok(count > 0)
    }

    pub fn delete_data_source(&self, id: i64) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM data_sources WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ── Measure operations ──

    pub fn list_measures(&self, data_source_id: Option<i64>) -> anyhow::Result<Vec<MeasureConfig>> {
        let conn = self.conn.lock().unwrap();
        let sql = match data_source_id {
            Some(_) => "SELECT id, name, display_name, weight, higher_is_better, format_kind, \
                        data_source_id, value_column, filter_criteria, is_active \
                        FROM measures WHERE data_source_id = ?1 ORDER BY name ASC",
            None => "SELECT id, name, display_name, weight, higher_is_better, format_kind, \
                     data_source_id, value_column, filter_criteria, is_active \
                     FROM measures ORDER BY name ASC",
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = match data_source_id {
            Some(ds) => stmt
                .query_map(params![ds], Self::row_to_measure)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], Self::row_to_measure)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Measures feeding report-card generation and trend analysis; the
    /// batch engines never see inactive measures.
    pub fn list_active_measures(&self) -> anyhow::Result<Vec<MeasureConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, display_name, weight, higher_is_better, format_kind, \
             data_source_id, value_column, filter_criteria, is_active \
             FROM measures WHERE is_active = 1 ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_measure)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_measure(&self, id: i64) -> anyhow::Result<Option<MeasureConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, display_name, weight, higher_is_better, format_kind, \
             data_source_id, value_column, filter_criteria, is_active FROM measures WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::row_to_measure)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_measure_by_name(&self, name: &str) -> anyhow::Result<Option<MeasureConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, display_name, weight, higher_is_better, format_kind, \
             data_source_id, value_column, filter_criteria, is_active FROM measures WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], Self::row_to_measure)?;
        Ok(rows.next().transpose()?)
    }

    fn row_to_measure(row: &rusqlite::Row) -> rusqlite::Result<MeasureConfig> {
        let format_kind_str: String = row.get(5)?;
        let format_kind = match format_kind_str.as_str() {
            "currency" => crate::models::measure::FormatKind::Currency,
            "percentage" => crate::models::measure::FormatKind::Percentage,
            _ => crate::models::measure::FormatKind::Number,
        };
        let filter_json: String = row.get(8)?;
        let filter_criteria = serde_json::from_str(&filter_json).unwrap_or_default();
        Ok(MeasureConfig {
            id: row.get(0)?,
            name: row.get(1)?,
            display_name: row.get(2)?,
            weight: row.get(3)?,
            higher_is_better: row.get(4)?,
            format_kind,
            data_source_id: row.get(6)?,
            value_column: row.get(7)?,
            filter_criteria,
            is_active: row.get(9)?,
        })
    }

    pub fn create_measure(
        &self,
        name: &str,
        display_name: &str,
        weight: u8,
        higher_is_better: bool,
        format_kind: &str,
        data_source_id: i64,
        value_column: &str,
        filter_criteria: &std::collections::HashMap<String, String>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let filter_json = serde_json::to_string(filter_criteria)?;
        conn.execute(
            "INSERT INTO measures (name, display_name, weight, higher_is_better, format_kind, data_source_id, value_column, filter_criteria) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![name, display_name, weight, higher_is_better, format_kind, data_source_id, value_column, filter_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_measure(
        &self,
        id: i64,
        display_name: Option<&str>,
        weight: Option<u8>,
        higher_is_better: Option<bool>,
        format_kind: Option<&str>,
        is_active: Option<bool>,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let existing = {
            let mut stmt = conn.prepare(
                "SELECT id, name, display_name, weight, higher_is_better, format_kind, \
                 data_source_id, value_column, filter_criteria, is_active FROM measures WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], Self::row_to_measure)?;
            match rows.next().transpose()? {
                Some(m) => m,
                None => return Ok(false),
            }
        };
        let new_display_name = display_name.unwrap_or(&existing.display_name);
        let new_weight = weight.unwrap_or(existing.weight);
        let new_higher_is_better = higher_is_better.unwrap_or(existing.higher_is_better);
        let new_format_kind = format_kind.map(|s| s.to_string()).unwrap_or_else(|| {
            match existing.format_kind {
                crate::models::measure::FormatKind::Currency => "currency".to_string(),
                crate::models::measure::FormatKind::Percentage => "percentage".to_string(),
                crate::models::measure::FormatKind::Number => "number".to_string(),
            }
        });
        let new_active = is_active.unwrap_or(existing.is_active);
        let count = conn.execute(
            "UPDATE measures SET display_name = ?2, weight = ?3, higher_is_better = ?4, format_kind = ?5, \
             is_active = ?6, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
            params![id, new_display_name, new_weight, new_higher_is_better, new_format_kind, new_active],
        )?;
        Ok(count > 0)
    }

    pub fn delete_measure(&self, id: i64) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM measures WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ── Chart definition operations ──

    pub fn list_chart_definitions(&self) -> anyhow::Result<Vec<ChartDefinition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chart_type, data_source_id, chart_config, is_active \
             FROM chart_definitions ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_chart_definition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_chart_definition(&self, id: i64) -> anyhow::Result<Option<ChartDefinition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chart_type, data_source_id, chart_config, is_active \
             FROM chart_definitions WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], Self::row_to_chart_definition)?;
        Ok(rows.next().transpose()?)
    }

    fn row_to_chart_definition(row: &rusqlite::Row) -> rusqlite::Result<ChartDefinition> {
        let config_json: String = row.get(3)?;
        let chart_config: serde_json::Value = serde_json::from_str(&config_json).unwrap_or(serde_json::json!({}));
        Ok(ChartDefinition {
            id: row.get(0)?,
            chart_type: row.get(1)?,
            data_source_id: row.get(2)?,
            chart_config,
            is_active: row.get(4)?,
        })
    }

    pub fn create_chart_definition(
        &self,
        chart_type: &str,
        data_source_id: i64,
        chart_config: &serde_json::Value,
    ) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let config_json = serde_json::to_string(chart_config)?;
        conn.execute(
            "INSERT INTO chart_definitions (chart_type, data_source_id, chart_config) VALUES (?1, ?2, ?3)",
            params![chart_type, data_source_id, config_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_chart_definition(
        &self,
        id: i64,
        chart_type: Option<&str>,
        chart_config: Option<&serde_json::Value>,
        is_active: Option<bool>,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let existing = {
            let mut stmt = conn.prepare(
                "SELECT id, chart_type, data_source_id, chart_config, is_active FROM chart_definitions WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![id], Self::row_to_chart_definition)?;
            match rows.next().transpose()? {
                Some(c) => c,
                None => return Ok(false),
            }
        };
        let new_type = chart_type.unwrap_or(&existing.chart_type);
        let new_config = chart_config.unwrap_or(&existing.chart_config);
        let new_active = is_active.unwrap_or(existing.is_active);
        let config_json = serde_json::to_string(new_config)?;
        let count = conn.execute(
            "UPDATE chart_definitions SET chart_type = ?2, chart_config = ?3, is_active = ?4, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
            params![id, new_type, config_json, new_active],
        )?;
        Ok(count > 0)
    }

    pub fn delete_chart_definition(&self, id: i64) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM chart_definitions WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }
}
