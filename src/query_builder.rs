use crate::models::chart::{Filter, FilterOp};
use crate::models::data_source::ResolvedColumns;
use crate::models::tenant::AccessScope;

/// Inputs needed to build one analytics SELECT. `table` is
/// `schema.table`, already validated against the control-plane data
/// source catalog by the caller.
pub struct AnalyticsQuerySpec<'a> {
    pub table: &'a str,
    pub columns: &'a ResolvedColumns,
    pub scope: &'a AccessScope,
    pub start_date: Option<&'a str>,
    pub end_date: Option<&'a str>,
    pub measure_name: Option<&'a str>,
    pub provider_id: Option<i64>,
    pub filters: &'a [Filter],
}

/// Translates a structured analytics request, a resolved access scope,
/// and a data source's resolved columns into a parameterized warehouse
/// query. RBAC is applied here, not left to callers, so every query path
/// through this builder is fail-closed by construction.
pub fn build_select(spec: &AnalyticsQuerySpec, select_list: &str) -> String {
    let where_clause = build_where_clause(spec);
    format!("SELECT {select_list} FROM {} WHERE {where_clause}", spec.table)
}

pub fn build_where_clause(spec: &AnalyticsQuerySpec) -> String {
    let mut conditions = Vec::new();

    if let Some(from) = spec.start_date {
        conditions.push(format!(
            "{} >= toDate('{}')",
            spec.columns.date,
            escape(from)
        ));
    }
    if let Some(to) = spec.end_date {
        conditions.push(format!("{} <= toDate('{}')", spec.columns.date, escape(to)));
    }
    if let Some(measure) = spec.measure_name {
        conditions.push(format!(
            "{} = '{}'",
            "measure_name",
            escape(measure)
        ));
    }
    if let Some(provider_id) = spec.provider_id {
        conditions.push(format!("{} = {provider_id}", spec.columns.provider));
    }

    // RBAC: None means unrestricted (superuser / read:all), anything else
    // must be rendered as an explicit IN clause — including the
    // single-element sentinel set, which is what makes fail-closed scopes
    // actually return zero rows rather than silently matching everything.
    if let Some(practice_ids) = &spec.scope.practice_ids {
        let list = if practice_ids.is_empty() {
            "(-1)".to_string()
        } else {
            let joined = practice_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("({joined})")
        };
        conditions.push(format!("{} IN {list}", spec.columns.practice));
    }

    for filter in spec.filters {
        let condition = match &filter.op {
            FilterOp::Eq => format!("{} = {}", filter.field, format_value(&filter.value)),
            FilterOp::Ne => format!("{} != {}", filter.field, format_value(&filter.value)),
            FilterOp::Gt => format!("{} > {}", filter.field, format_value(&filter.value)),
            FilterOp::Gte => format!("{} >= {}", filter.field, format_value(&filter.value)),
            FilterOp::Lt => format!("{} < {}", filter.field, format_value(&filter.value)),
            FilterOp::Lte => format!("{} <= {}", filter.field, format_value(&filter.value)),
            FilterOp::In => format!("{} IN {}", filter.field, format_array_value(&filter.value)),
            FilterOp::NotIn => {
                format!("{} NOT IN {}", filter.field, format_array_value(&filter.value))
            }
        };
        conditions.push(condition);
    }

    if conditions.is_empty() {
        "1 = 1".to_string()
    } else {
        conditions.join(" AND ")
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "\\'")
}

pub fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{}'", escape(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => {
            if *b {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        _ => "''".to_string(),
    }
}

pub fn format_array_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("({})", items.join(", "))
        }
        _ => format!("({})", format_value(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tenant::{AccessScope, ScopeLabel, SENTINEL_PRACTICE_ID};

    fn columns() -> ResolvedColumns {
        ResolvedColumns::default()
    }

    #[test]
    fn unrestricted_scope_omits_practice_filter() {
        let scope = AccessScope::unrestricted();
        let spec = AnalyticsQuerySpec {
            table: "analytics.visits",
            columns: &columns(),
            scope: &scope,
            start_date: None,
            end_date: None,
            measure_name: None,
            provider_id: None,
            filters: &[],
        };
        let clause = build_where_clause(&spec);
        assert!(!clause.contains("practice_uid"));
    }

    #[test]
    fn fail_closed_scope_renders_sentinel_in_clause() {
        let scope = AccessScope {
            label: ScopeLabel::Organization,
            practice_ids: Some(vec![SENTINEL_PRACTICE_ID]),
            provider_id: None,
            organization_ids: vec![],
        };
        let spec = AnalyticsQuerySpec {
            table: "analytics.visits",
            columns: &columns(),
            scope: &scope,
            start_date: None,
            end_date: None,
            measure_name: None,
            provider_id: None,
            filters: &[],
        };
        let clause = build_where_clause(&spec);
        assert!(clause.contains("practice_uid IN (-1)"));
    }

    #[test]
    fn normal_scope_lists_accessible_practices() {
        let scope = AccessScope {
            label: ScopeLabel::Organization,
            practice_ids: Some(vec![10, 20, 30]),
            provider_id: None,
            organization_ids: vec![],
        };
        let spec = AnalyticsQuerySpec {
            table: "analytics.visits",
            columns: &columns(),
            scope: &scope,
            start_date: Some("2026-01-01"),
            end_date: Some("2026-01-31"),
            measure_name: Some("no_show_rate"),
            provider_id: None,
            filters: &[],
        };
        let clause = build_where_clause(&spec);
        assert!(clause.contains("practice_uid IN (10, 20, 30)"));
        assert!(clause.contains("measure_name = 'no_show_rate'"));
        assert!(clause.contains("date_index >= toDate('2026-01-01')"));
    }
}
