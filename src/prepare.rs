//! Projection of discovered rows onto target fields.
//!
//! Each prepared row carries the provenance (`form_id`, `script_name`,
//! `field_keys`) the orchestrator later checks before dispatching a table.

use log::{debug, warn};
use serde_json::Value;

use crate::{
    model::{ColumnKeyBinding, FieldMapping, PreparedSubmissionRow, Row, Table, TableData},
    registry,
};

pub fn prepare_table(
    table: &Table,
    bindings: &[ColumnKeyBinding],
    mapping: Option<&FieldMapping>,
) -> Vec<PreparedSubmissionRow> {
    let field_keys = registry::display_names(bindings);
    let uploaded_column_keys = registry::source_columns(bindings);
    let all_column_keys = table.columns();
    let form_id = mapping
        .map(|m| m.target_form_id().to_string())
        .unwrap_or_default();

    table
        .rows
        .iter()
        .map(|row| PreparedSubmissionRow {
            form_id: form_id.clone(),
            script_name: table.name.clone(),
            field_keys: field_keys.clone(),
            uploaded_column_keys: uploaded_column_keys.clone(),
            all_column_keys: all_column_keys.clone(),
            values: project_row(row, bindings),
        })
        .collect()
}

fn project_row(row: &Row, bindings: &[ColumnKeyBinding]) -> Row {
    bindings
        .iter()
        .map(|binding| {
            let value = binding
                .mapped_source_field
                .as_deref()
                .and_then(|source| row.get(source))
                .filter(|value| !value.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            (binding.display_name.clone(), value)
        })
        .collect()
}

/// Prepares every table, resolving its mapping by name. `bindings_for` returns
/// the bindings to use for a table given its resolved mapping.
pub fn prepare_all<F>(tables: &[Table], mappings: &[FieldMapping], mut bindings_for: F) -> TableData
where
    F: FnMut(&Table, Option<&FieldMapping>) -> Vec<ColumnKeyBinding>,
{
    let mut data = TableData::new();
    for table in tables {
        let mapping = mappings.iter().find(|m| m.matches_table(&table.name));
        if mapping.is_none() {
            warn!(
                "No mapping for table '{}'; rows are prepared without a target form",
                table.name
            );
        }
        let bindings = bindings_for(table, mapping);
        let rows = prepare_table(table, &bindings, mapping);
        debug!(
            "Prepared {} row(s) for table '{}' across {} field(s)",
            rows.len(),
            table.name,
            bindings.len()
        );
        data.insert(table.name.clone(), rows);
    }
    data
}
