//! Ordered target-field bindings for the tables on screen.
//!
//! Bindings are rebuilt on every load, so the registry only owns the id
//! source. All edits are pure: they return a new binding list and leave the
//! input untouched.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::model::{ColumnKeyBinding, FormField};

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic ids `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

#[derive(Debug, Default)]
pub struct ColumnKeyRegistry<G = UuidIds> {
    ids: G,
}

impl<G: IdGenerator> ColumnKeyRegistry<G> {
    pub fn new(ids: G) -> Self {
        Self { ids }
    }

    pub fn binding(&self, display_name: &str, source: Option<&str>) -> ColumnKeyBinding {
        ColumnKeyBinding {
            id: self.ids.next_id(),
            display_name: display_name.to_string(),
            mapped_source_field: source.map(str::to_string),
        }
    }

    /// One identity binding per source column.
    pub fn from_source_columns(&self, columns: &[String]) -> Vec<ColumnKeyBinding> {
        columns
            .iter()
            .map(|column| self.binding(column, Some(column)))
            .collect()
    }

    /// One binding per target form field. A field is bound to its declared
    /// `sourceApiField` only when the source has that column and no earlier
    /// field already took it.
    pub fn from_form_fields(
        &self,
        fields: &[FormField],
        source_columns: &[String],
    ) -> Vec<ColumnKeyBinding> {
        let mut used: Vec<&str> = Vec::new();
        fields
            .iter()
            .map(|field| {
                let source = field
                    .source_api_field
                    .as_deref()
                    .filter(|src| source_columns.iter().any(|c| c == src))
                    .filter(|src| !used.contains(src));
                if let Some(src) = source {
                    used.push(src);
                }
                self.binding(&field.label, source)
            })
            .collect()
    }

    pub fn push(
        &self,
        bindings: &[ColumnKeyBinding],
        display_name: &str,
        source: Option<&str>,
    ) -> Vec<ColumnKeyBinding> {
        let mut next = bindings.to_vec();
        next.push(self.binding(display_name, source));
        next
    }
}

fn update_one(
    bindings: &[ColumnKeyBinding],
    id: &str,
    edit: impl Fn(&mut ColumnKeyBinding),
) -> Vec<ColumnKeyBinding> {
    bindings
        .iter()
        .map(|binding| {
            let mut binding = binding.clone();
            if binding.id == id {
                edit(&mut binding);
            }
            binding
        })
        .collect()
}

pub fn rebind(
    bindings: &[ColumnKeyBinding],
    id: &str,
    new_source_field: Option<&str>,
) -> Vec<ColumnKeyBinding> {
    update_one(bindings, id, |b| {
        b.mapped_source_field = new_source_field.map(str::to_string)
    })
}

pub fn unbind(bindings: &[ColumnKeyBinding], id: &str) -> Vec<ColumnKeyBinding> {
    rebind(bindings, id, None)
}

pub fn rename(bindings: &[ColumnKeyBinding], id: &str, display_name: &str) -> Vec<ColumnKeyBinding> {
    update_one(bindings, id, |b| b.display_name = display_name.to_string())
}

pub fn remove(bindings: &[ColumnKeyBinding], id: &str) -> Vec<ColumnKeyBinding> {
    bindings.iter().filter(|b| b.id != id).cloned().collect()
}

/// Bound source column per binding, empty for unbound ones.
pub fn source_columns(bindings: &[ColumnKeyBinding]) -> Vec<String> {
    bindings
        .iter()
        .map(|b| b.mapped_source_field.clone().unwrap_or_default())
        .collect()
}

pub fn display_names(bindings: &[ColumnKeyBinding]) -> Vec<String> {
    bindings.iter().map(|b| b.display_name.clone()).collect()
}
