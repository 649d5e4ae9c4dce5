//! Per-table submission of prepared rows.
//!
//! Every table with complete provenance becomes one independent dispatch to
//! the [`SubmissionService`]. Dispatches run concurrently and the batch waits
//! for all of them to settle; a failing table never cancels a sibling.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::{
    error::{BatchError, ServiceError},
    model::{PreparedSubmissionRow, SubmissionOutcome, TableData},
    service::{SubmissionLedger, SubmissionPayload, SubmissionReceipt, SubmissionService},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    AllSucceeded,
    AllFailed,
    Mixed,
    NothingToSubmit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub outcomes: Vec<SubmissionOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    /// Tables that passed validation and were sent to the service.
    pub dispatched: usize,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<SubmissionOutcome>, dispatched: usize) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        let failed = outcomes.len() - succeeded;
        Self {
            outcomes,
            succeeded,
            failed,
            dispatched,
        }
    }

    pub fn state(&self) -> BatchState {
        if self.dispatched == 0 {
            BatchState::NothingToSubmit
        } else if self.failed == 0 {
            BatchState::AllSucceeded
        } else if self.succeeded == 0 {
            BatchState::AllFailed
        } else {
            BatchState::Mixed
        }
    }

    pub fn message(&self) -> String {
        match self.state() {
            BatchState::AllSucceeded => {
                format!("All {} table(s) saved successfully!", self.succeeded)
            }
            BatchState::Mixed => format!(
                "{} table(s) saved, {} failed.",
                self.succeeded, self.failed
            ),
            BatchState::AllFailed => format!("All {} submission(s) failed.", self.failed),
            BatchState::NothingToSubmit if self.failed > 0 => format!(
                "No data prepared for submission; {} table(s) had incomplete mappings.",
                self.failed
            ),
            BatchState::NothingToSubmit => "No data prepared for submission.".to_string(),
        }
    }

    pub fn submission_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded)
            .filter_map(|o| o.submission_id.clone())
            .collect()
    }
}

/// Checks a table's provenance and builds its payload.
pub fn build_payload(
    table_name: &str,
    rows: &[PreparedSubmissionRow],
) -> Result<(String, SubmissionPayload), String> {
    let first = rows
        .first()
        .ok_or_else(|| format!("No data rows found for table: {table_name}"))?;
    if !first.has_provenance() {
        return Err(format!("Incomplete mapping info for table: {table_name}"));
    }
    let field_keys = first.field_keys.clone();
    let data = rows
        .iter()
        .map(|row| {
            field_keys
                .iter()
                .map(|key| match row.values.get(key) {
                    Some(Value::Null) | None => Value::String(String::new()),
                    Some(value) => value.clone(),
                })
                .collect()
        })
        .collect();
    let payload = SubmissionPayload {
        data,
        name: first.script_name.clone(),
        field_keys,
        uploaded_column_keys: first.uploaded_column_keys.clone(),
        all_column_keys: first.all_column_keys.clone(),
    };
    Ok((first.form_id.clone(), payload))
}

fn outcome_from(
    table_name: &str,
    result: Result<SubmissionReceipt, ServiceError>,
) -> SubmissionOutcome {
    let generic = || format!("Save failed for {table_name}");
    match result {
        Ok(receipt) if receipt.success => SubmissionOutcome {
            table_name: table_name.to_string(),
            succeeded: true,
            message: receipt
                .message
                .unwrap_or_else(|| "Saved successfully.".to_string()),
            submission_id: receipt.id,
        },
        Ok(receipt) => {
            warn!("Submission for '{table_name}' was not accepted");
            SubmissionOutcome::failed(table_name, receipt.message.unwrap_or_else(generic))
        }
        Err(err) => {
            warn!("Submission error for '{table_name}': {err}");
            let message = err.server_message().map(str::to_string);
            SubmissionOutcome::failed(table_name, message.unwrap_or_else(generic))
        }
    }
}

pub struct SubmissionOrchestrator {
    service: Arc<dyn SubmissionService>,
    ledger: Option<Arc<dyn SubmissionLedger>>,
    source_id: String,
}

impl SubmissionOrchestrator {
    pub fn new(service: Arc<dyn SubmissionService>, source_id: impl Into<String>) -> Self {
        Self {
            service,
            ledger: None,
            source_id: source_id.into(),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn SubmissionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub async fn submit(&self, table_data: &TableData) -> Result<BatchSummary, BatchError> {
        let mut outcomes: Vec<Option<SubmissionOutcome>> = vec![None; table_data.len()];
        let mut dispatches = Vec::new();

        for (idx, (table_name, rows)) in table_data.iter().enumerate() {
            match build_payload(table_name, rows) {
                Ok((form_id, payload)) => {
                    debug!(
                        "Dispatching {} row(s) x {} field(s) for '{table_name}' to form {form_id}",
                        payload.data.len(),
                        payload.field_keys.len()
                    );
                    let service = Arc::clone(&self.service);
                    let table_name = table_name.clone();
                    let handle = tokio::spawn(async move {
                        let result = service.submit(&form_id, &payload).await;
                        outcome_from(&table_name, result)
                    });
                    dispatches.push((idx, handle));
                }
                Err(reason) => {
                    warn!("{reason}; skipping submission");
                    outcomes[idx] = Some(SubmissionOutcome::failed(table_name.as_str(), reason));
                }
            }
        }

        let dispatched = dispatches.len();
        let (indices, handles): (Vec<_>, Vec<_>) = dispatches.into_iter().unzip();
        for (idx, joined) in indices.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => outcomes[idx] = Some(outcome),
                Err(err) => {
                    error!("Submission task failed: {err}");
                    return Err(BatchError::Orchestration(err.to_string()));
                }
            }
        }

        let outcomes = outcomes
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| BatchError::Orchestration("missing submission outcome".into()))?;
        let summary = BatchSummary::from_outcomes(outcomes, dispatched);
        info!(
            "Submission batch for source '{}': {} succeeded, {} failed",
            self.source_id, summary.succeeded, summary.failed
        );
        self.record_ids(&summary).await;
        Ok(summary)
    }

    async fn record_ids(&self, summary: &BatchSummary) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let ids = summary.submission_ids();
        if ids.is_empty() {
            return;
        }
        if let Err(err) = ledger.record_submission_ids(&self.source_id, &ids).await {
            warn!(
                "Failed to record {} submission id(s) for source '{}': {err}",
                ids.len(),
                self.source_id
            );
        }
    }
}
