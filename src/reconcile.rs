//! Reconciliation of discovered tables against the persisted mapping set.
//!
//! [`plan`] decides, without side effects, whether the mapping set already
//! covers every discovered table and which mappings to synthesize otherwise.
//! [`reconcile`] executes that plan: it persists synthesized mappings through
//! a [`MappingService`] once, adopts the service's answer on success and keeps
//! the local set when persistence fails.
//!
//! A mapping is never removed here. Persisted mappings for tables missing from
//! the current discovery pass travel through untouched.

use log::{debug, info, warn};

use crate::{
    model::{FieldMapping, Table, names_match},
    service::MappingService,
};

/// Why the persisted set was returned as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnchangedReason {
    NoTables,
    NoPersistedMappings,
    NoTemplate,
    AlreadyAligned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Unchanged(UnchangedReason),
    /// Full candidate set: one resolved mapping per discovered table in
    /// discovery order, then persisted mappings no table claimed.
    Persist {
        candidates: Vec<FieldMapping>,
        synthesized: Vec<String>,
    },
    /// Some tables could not be resolved; nothing is written this pass.
    Abandon { skipped: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileStatus {
    Unchanged(UnchangedReason),
    Persisted { synthesized: Vec<String> },
    LocalFallback {
        synthesized: Vec<String>,
        warning: String,
    },
    Abandoned { skipped: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub mappings: Vec<FieldMapping>,
    pub status: ReconcileStatus,
}

impl Reconciliation {
    /// Single best-effort warning to surface to the user, if any.
    pub fn warning(&self) -> Option<String> {
        match &self.status {
            ReconcileStatus::LocalFallback { warning, .. } => Some(warning.clone()),
            ReconcileStatus::Abandoned { skipped } => Some(format!(
                "Skipped mapping for {} table(s) without a template: {}",
                skipped.len(),
                skipped.join(", ")
            )),
            _ => None,
        }
    }
}

/// First persisted mapping whose first binding lists at least one column.
pub fn select_template(persisted: &[FieldMapping]) -> Option<&FieldMapping> {
    persisted.iter().find(|mapping| mapping.is_valid())
}

/// Tables with no case-insensitive name match among the persisted mappings.
pub fn unmatched_tables<'a>(tables: &'a [Table], persisted: &[FieldMapping]) -> Vec<&'a str> {
    tables
        .iter()
        .filter(|table| !persisted.iter().any(|m| m.matches_table(&table.name)))
        .map(|table| table.name.as_str())
        .collect()
}

/// Deep copy of `template` renamed for `table_name`, seeded with the
/// template's first form field label as a placeholder binding.
pub fn synthesize_from_template(template: &FieldMapping, table_name: &str) -> FieldMapping {
    let mut mapping = template.clone();
    mapping.id = None;
    mapping.name = table_name.to_string();

    let seed = template
        .target_form_fields()
        .first()
        .map(|field| field.label.clone())
        .filter(|label| !label.is_empty())
        .map(|label| vec![label])
        .unwrap_or_default();
    let mut first = template
        .field_mappings
        .first()
        .cloned()
        .unwrap_or_default();
    first.fields = seed;
    mapping.field_mappings = vec![first];
    mapping
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Existing(FieldMapping),
    Synthesized(FieldMapping),
}

/// Mapping to use for one table: the persisted one with a matching name,
/// else a clone of `template`. `None` when neither exists. The result always
/// carries at least one binding entry.
pub fn resolve_table(
    table_name: &str,
    persisted: &[FieldMapping],
    template: Option<&FieldMapping>,
) -> Option<Resolved> {
    let resolved = match persisted.iter().find(|m| m.matches_table(table_name)) {
        Some(mapping) => {
            let mut mapping = mapping.clone();
            mapping.ensure_binding_shape();
            Resolved::Existing(mapping)
        }
        None => Resolved::Synthesized(synthesize_from_template(template?, table_name)),
    };
    Some(resolved)
}

pub fn plan(tables: &[Table], persisted: &[FieldMapping]) -> Plan {
    if tables.is_empty() {
        return Plan::Unchanged(UnchangedReason::NoTables);
    }
    if persisted.is_empty() {
        return Plan::Unchanged(UnchangedReason::NoPersistedMappings);
    }
    let Some(template) = select_template(persisted) else {
        return Plan::Unchanged(UnchangedReason::NoTemplate);
    };
    if unmatched_tables(tables, persisted).is_empty() {
        return Plan::Unchanged(UnchangedReason::AlreadyAligned);
    }

    let mut candidates: Vec<FieldMapping> = Vec::with_capacity(tables.len());
    let mut synthesized = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    let mut claimed = vec![false; persisted.len()];

    for table in tables {
        // Case variants of one name share a single mapping.
        if candidates.iter().any(|m| m.matches_table(&table.name))
            || skipped.iter().any(|name| names_match(name, &table.name))
        {
            debug!("Table '{}' already resolved under another case", table.name);
            continue;
        }
        if let Some(idx) = persisted.iter().position(|m| m.matches_table(&table.name)) {
            claimed[idx] = true;
        }
        match resolve_table(&table.name, persisted, Some(template)) {
            Some(Resolved::Existing(mapping)) => candidates.push(mapping),
            Some(Resolved::Synthesized(mapping)) => {
                synthesized.push(table.name.clone());
                candidates.push(mapping);
            }
            None => skipped.push(table.name.clone()),
        }
    }

    if !skipped.is_empty() {
        return Plan::Abandon { skipped };
    }

    candidates.extend(
        persisted
            .iter()
            .zip(claimed)
            .filter(|(_, claimed)| !claimed)
            .map(|(mapping, _)| mapping.clone()),
    );
    Plan::Persist {
        candidates,
        synthesized,
    }
}

pub async fn reconcile<S>(
    service: &S,
    source_id: &str,
    tables: &[Table],
    persisted: Vec<FieldMapping>,
) -> Reconciliation
where
    S: MappingService + ?Sized,
{
    match plan(tables, &persisted) {
        Plan::Unchanged(reason) => {
            debug!("Mappings for source '{source_id}' left unchanged ({reason:?})");
            Reconciliation {
                mappings: persisted,
                status: ReconcileStatus::Unchanged(reason),
            }
        }
        Plan::Abandon { skipped } => {
            warn!(
                "Skipping mapping synthesis for source '{source_id}'; unresolved table(s): {}",
                skipped.join(", ")
            );
            Reconciliation {
                mappings: persisted,
                status: ReconcileStatus::Abandoned { skipped },
            }
        }
        Plan::Persist {
            candidates,
            synthesized,
        } => {
            info!(
                "Synthesized {} mapping(s) for source '{source_id}': {}",
                synthesized.len(),
                synthesized.join(", ")
            );
            persist(service, source_id, candidates, synthesized).await
        }
    }
}

async fn persist<S>(
    service: &S,
    source_id: &str,
    candidates: Vec<FieldMapping>,
    synthesized: Vec<String>,
) -> Reconciliation
where
    S: MappingService + ?Sized,
{
    let failure = match service.update(source_id, &candidates).await {
        Ok(update) if update.success => {
            info!(
                "Form mappings updated for source '{source_id}' ({} mapping(s))",
                update.mappings.len()
            );
            return Reconciliation {
                mappings: update.mappings,
                status: ReconcileStatus::Persisted { synthesized },
            };
        }
        Ok(_) => "mapping update was not accepted".to_string(),
        Err(err) => err.to_string(),
    };
    warn!("Failed to persist mappings for source '{source_id}': {failure}; using local mappings");
    Reconciliation {
        mappings: candidates,
        status: ReconcileStatus::LocalFallback {
            synthesized,
            warning: format!("Form mappings could not be saved ({failure}); changes may be lost"),
        },
    }
}

/// Normalizes a mapping set the way a mapping store accepts it: every mapping
/// carries at least one binding and names are unique case-insensitively
/// (first occurrence wins).
pub fn normalize_mappings(mappings: &[FieldMapping]) -> Vec<FieldMapping> {
    let mut normalized: Vec<FieldMapping> = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        if normalized.iter().any(|m| m.matches_table(&mapping.name)) {
            debug!("Dropping duplicate mapping entry '{}'", mapping.name);
            continue;
        }
        let mut mapping = mapping.clone();
        mapping.ensure_binding_shape();
        normalized.push(mapping);
    }
    normalized
}
