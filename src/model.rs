//! Shared data model for discovered tables, persisted form mappings,
//! column-key bindings and prepared submission rows.
//!
//! Field names on the serialized side follow the JSON the surrounding
//! application exchanges (`formId`, `fieldMappings`, `form_id`, ...). Keys this
//! crate does not interpret are kept in flattened `extra` maps so a mapping
//! read from a server is written back without losing anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One source row: column name to cell value, in source column order.
pub type Row = Map<String, Value>;

/// Prepared rows grouped by table name.
pub type TableData = BTreeMap<String, Vec<PreparedSubmissionRow>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(rename = "table")]
    pub name: String,
    #[serde(rename = "data", default)]
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Column names across all rows, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    #[serde(default)]
    pub label: String,
    #[serde(
        rename = "sourceApiField",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_api_field: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormField {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

/// The form a mapping routes into, with its declared fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetForm {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBinding {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldBinding {
    pub fn with_fields(fields: Vec<String>) -> Self {
        Self {
            fields,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "formId", default)]
    pub form: TargetForm,
    #[serde(rename = "fieldMappings", default)]
    pub field_mappings: Vec<FieldBinding>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldMapping {
    pub fn target_form_id(&self) -> &str {
        &self.form.id
    }

    pub fn target_form_fields(&self) -> &[FormField] {
        &self.form.fields
    }

    /// Usable as a template or for submission: the first binding lists at
    /// least one source column.
    pub fn is_valid(&self) -> bool {
        self.field_mappings
            .first()
            .is_some_and(|binding| !binding.fields.is_empty())
    }

    pub fn matches_table(&self, table_name: &str) -> bool {
        names_match(&self.name, table_name)
    }

    /// Guarantees at least one binding entry so readers never see an empty shape.
    pub fn ensure_binding_shape(&mut self) {
        if self.field_mappings.is_empty() {
            self.field_mappings.push(FieldBinding::default());
        }
    }
}

pub fn names_match(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnKeyBinding {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "mappedSourceField", default)]
    pub mapped_source_field: Option<String>,
}

/// A row already projected into target field names and tagged with the
/// provenance the orchestrator needs. Projected values sit under their own
/// `values` key so column names never shadow provenance fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedSubmissionRow {
    #[serde(default)]
    pub form_id: String,
    #[serde(default)]
    pub script_name: String,
    #[serde(default)]
    pub field_keys: Vec<String>,
    #[serde(default)]
    pub uploaded_column_keys: Vec<String>,
    #[serde(default)]
    pub all_column_keys: Vec<String>,
    #[serde(default)]
    pub values: Row,
}

impl PreparedSubmissionRow {
    pub fn has_provenance(&self) -> bool {
        !self.form_id.is_empty() && !self.script_name.is_empty() && !self.field_keys.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub table_name: String,
    pub succeeded: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
}

impl SubmissionOutcome {
    pub fn failed(table_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            succeeded: false,
            message: message.into(),
            submission_id: None,
        }
    }
}
