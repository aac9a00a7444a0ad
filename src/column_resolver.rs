use crate::models::data_source::{DataSourceDescriptor, ResolvedColumns};

/// Maps logical column roles onto the physical column names carried by a
/// data source's column catalog. Falls back to the standard defaults when
/// a descriptor is absent or a role is unassigned.
pub struct ColumnResolver;

impl ColumnResolver {
    pub fn resolve(descriptor: Option<&DataSourceDescriptor>) -> ResolvedColumns {
        let defaults = ResolvedColumns::default();
        let Some(descriptor) = descriptor else {
            return defaults;
        };

        let mut resolved = defaults.clone();
        for entry in &descriptor.column_catalog {
            if entry.is_measure {
                resolved.measure = entry.column_name.clone();
            }
            // A column flagged both date and time-period is a time-period
            // column first: treating it as the date role would silently
            // substitute period names for calendar dates downstream.
            if entry.is_date && !entry.is_time_period {
                resolved.date = entry.column_name.clone();
            }
            if entry.is_time_period {
                resolved.time_period = entry.column_name.clone();
            }
            if entry.is_practice {
                resolved.practice = entry.column_name.clone();
            }
            if entry.is_provider {
                resolved.provider = entry.column_name.clone();
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::data_source::ColumnCatalogEntry;

    fn descriptor(entries: Vec<ColumnCatalogEntry>) -> DataSourceDescriptor {
        DataSourceDescriptor {
            id: 1,
            logical_name: "visits".into(),
            schema_name: "analytics".into(),
            table_name: "visits".into(),
            column_catalog: entries,
            is_active: true,
        }
    }

    fn entry(name: &str, measure: bool, date: bool, period: bool) -> ColumnCatalogEntry {
        ColumnCatalogEntry {
            column_name: name.into(),
            display_name: name.into(),
            is_measure: measure,
            is_date: date,
            is_time_period: period,
            is_practice: false,
            is_provider: false,
            format_kind: None,
            icon: None,
        }
    }

    #[test]
    fn missing_descriptor_falls_back_to_defaults() {
        let resolved = ColumnResolver::resolve(None);
        assert_eq!(resolved.measure, "measure_value");
        assert_eq!(resolved.date, "date_index");
    }

    #[test]
    fn column_flagged_both_date_and_period_resolves_as_period_not_date() {
        let d = descriptor(vec![entry("bucket_label", false, true, true)]);
        let resolved = ColumnResolver::resolve(Some(&d));
        assert_eq!(resolved.time_period, "bucket_label");
        // date role keeps its default since no column was date-only
        assert_eq!(resolved.date, "date_index");
    }

    #[test]
    fn separate_date_and_period_columns_both_resolve() {
        let d = descriptor(vec![
            entry("visit_date", false, true, false),
            entry("fiscal_period", false, false, true),
            entry("charge_amount", true, false, false),
        ]);
        let resolved = ColumnResolver::resolve(Some(&d));
        assert_eq!(resolved.date, "visit_date");
        assert_eq!(resolved.time_period, "fiscal_period");
        assert_eq!(resolved.measure, "charge_amount");
    }

    #[test]
    fn practice_and_provider_roles_resolve_from_catalog() {
        let mut practice_col = entry("clinic_id", false, false, false);
        practice_col.is_practice = true;
        let mut provider_col = entry("clinician_id", false, false, false);
        provider_col.is_provider = true;
        let d = descriptor(vec![practice_col, provider_col]);
        let resolved = ColumnResolver::resolve(Some(&d));
        assert_eq!(resolved.practice, "clinic_id");
        assert_eq!(resolved.provider, "clinician_id");
    }
}
