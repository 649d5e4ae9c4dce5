//! Plain-text rendering for the CLI.

use std::fmt::Write as _;

use crate::{
    model::{FieldMapping, SubmissionOutcome, Table},
    reconcile::{ReconcileStatus, Reconciliation},
    submit::BatchSummary,
};

/// Left-aligned columns separated by two spaces; trailing blanks trimmed.
pub fn render_columns(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let mut emit = |cells: Vec<String>| {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(output, "{}", line.trim_end());
    };
    emit(headers.iter().map(|h| h.to_string()).collect());
    emit(widths.iter().map(|w| "-".repeat((*w).max(3))).collect());
    for row in rows {
        emit(row.iter().map(|cell| cell.replace(['\n', '\r', '\t'], " ")).collect());
    }
    output
}

pub fn render_tables(tables: &[Table]) -> String {
    let rows = tables
        .iter()
        .map(|table| {
            vec![
                table.name.clone(),
                table.rows.len().to_string(),
                table.columns().join(", "),
            ]
        })
        .collect::<Vec<_>>();
    render_columns(&["table", "rows", "columns"], &rows)
}

pub fn render_mappings(mappings: &[FieldMapping]) -> String {
    let rows = mappings
        .iter()
        .map(|mapping| {
            let bound = mapping
                .field_mappings
                .first()
                .map(|binding| binding.fields.join(", "))
                .unwrap_or_default();
            vec![
                mapping.name.clone(),
                mapping.target_form_id().to_string(),
                bound,
            ]
        })
        .collect::<Vec<_>>();
    render_columns(&["mapping", "form", "fields"], &rows)
}

pub fn render_reconciliation(result: &Reconciliation) -> String {
    let mut output = render_mappings(&result.mappings);
    let status = match &result.status {
        ReconcileStatus::Unchanged(reason) => format!("Mappings unchanged ({reason:?})"),
        ReconcileStatus::Persisted { synthesized } => {
            format!("Form mappings updated; created: {}", synthesized.join(", "))
        }
        ReconcileStatus::LocalFallback { synthesized, .. } => format!(
            "Using unsaved mappings; created: {}",
            synthesized.join(", ")
        ),
        ReconcileStatus::Abandoned { skipped } => {
            format!("Mappings unchanged; skipped: {}", skipped.join(", "))
        }
    };
    let _ = writeln!(output, "{status}");
    if let Some(warning) = result.warning() {
        let _ = writeln!(output, "warning: {warning}");
    }
    output
}

fn outcome_row(outcome: &SubmissionOutcome) -> Vec<String> {
    vec![
        outcome.table_name.clone(),
        if outcome.succeeded { "saved" } else { "failed" }.to_string(),
        outcome.message.clone(),
    ]
}

pub fn render_summary(summary: &BatchSummary) -> String {
    let rows = summary.outcomes.iter().map(outcome_row).collect::<Vec<_>>();
    let mut output = render_columns(&["table", "status", "message"], &rows);
    let _ = writeln!(output, "{}", summary.message());
    output
}
