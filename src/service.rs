//! Contracts for the collaborators this crate talks to.
//!
//! Transport, authentication and serialization belong to the implementations;
//! [`crate::store`] provides file-backed ones for the CLI, tests use in-memory
//! mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ServiceError, model::FieldMapping};

/// Authoritative answer of a mapping update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingUpdate {
    pub success: bool,
    #[serde(rename = "formMappings", default)]
    pub mappings: Vec<FieldMapping>,
}

/// Lookup and update of the mapping set persisted for one source.
#[async_trait]
pub trait MappingService: Send + Sync {
    async fn lookup(&self, source_id: &str) -> Result<Vec<FieldMapping>, ServiceError>;

    /// Replace the mapping set for `source_id`. The returned set may be
    /// normalized by the service and is authoritative on success.
    async fn update(
        &self,
        source_id: &str,
        mappings: &[FieldMapping],
    ) -> Result<MappingUpdate, ServiceError>;
}

/// Body of one per-table submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub data: Vec<Vec<Value>>,
    pub name: String,
    pub field_keys: Vec<String>,
    pub uploaded_column_keys: Vec<String>,
    #[serde(default)]
    pub all_column_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Per-form submission endpoint.
#[async_trait]
pub trait SubmissionService: Send + Sync + 'static {
    async fn submit(
        &self,
        form_id: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, ServiceError>;
}

/// Records which submissions a source produced.
#[async_trait]
pub trait SubmissionLedger: Send + Sync {
    async fn record_submission_ids(
        &self,
        source_id: &str,
        submission_ids: &[String],
    ) -> Result<(), ServiceError>;
}
