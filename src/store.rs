//! File-backed implementations of the service contracts.
//!
//! - [`JsonMappingStore`] keeps one `<source>.json` document per source,
//!   shaped `{"formMappings": [...]}`.
//! - [`OutboxSubmissionSink`] accepts submissions by writing each payload to
//!   `<outbox>/<form_id>/<submission_id>.json` and appends accepted ids to
//!   `<outbox>/ledger/<source>.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    model::FieldMapping,
    reconcile::normalize_mappings,
    service::{
        MappingService, MappingUpdate, SubmissionLedger, SubmissionPayload, SubmissionReceipt,
        SubmissionService,
    },
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingDocument {
    #[serde(rename = "formMappings", default)]
    form_mappings: Vec<FieldMapping>,
}

/// Rejects ids that would escape the store directory.
fn checked_id(id: &str) -> Result<&str, ServiceError> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0']);
    if valid {
        Ok(id)
    } else {
        Err(ServiceError::rejected(format!("Invalid identifier '{id}'")))
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ServiceError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct JsonMappingStore {
    dir: PathBuf,
}

impl JsonMappingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, source_id: &str) -> Result<PathBuf, ServiceError> {
        Ok(self.dir.join(format!("{}.json", checked_id(source_id)?)))
    }
}

#[async_trait]
impl MappingService for JsonMappingStore {
    async fn lookup(&self, source_id: &str) -> Result<Vec<FieldMapping>, ServiceError> {
        let path = self.path_for(source_id)?;
        let Some(bytes) = read_optional(&path).await? else {
            debug!("No mapping document at {path:?}");
            return Ok(Vec::new());
        };
        let document: MappingDocument = serde_json::from_slice(&bytes)?;
        Ok(document.form_mappings)
    }

    async fn update(
        &self,
        source_id: &str,
        mappings: &[FieldMapping],
    ) -> Result<MappingUpdate, ServiceError> {
        let path = self.path_for(source_id)?;
        let mut form_mappings = normalize_mappings(mappings);
        for mapping in &mut form_mappings {
            if mapping.id.is_none() {
                mapping.id = Some(Uuid::new_v4().to_string());
            }
        }
        let document = MappingDocument { form_mappings };
        write_json(&path, &document).await?;
        debug!(
            "Wrote {} mapping(s) to {path:?}",
            document.form_mappings.len()
        );
        Ok(MappingUpdate {
            success: true,
            mappings: document.form_mappings,
        })
    }
}

#[derive(Debug, Serialize)]
struct OutboxRecord<'a> {
    id: &'a str,
    form_id: &'a str,
    submitted_at: String,
    #[serde(flatten)]
    payload: &'a SubmissionPayload,
}

#[derive(Debug, Clone)]
pub struct OutboxSubmissionSink {
    dir: PathBuf,
}

impl OutboxSubmissionSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Server-side shape check: every row carries one value per field key.
pub fn validate_payload(payload: &SubmissionPayload) -> Result<(), ServiceError> {
    if payload.field_keys.is_empty() {
        return Err(ServiceError::rejected("Submission has no field keys"));
    }
    let expected = payload.field_keys.len();
    if let Some((idx, row)) = payload
        .data
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != expected)
    {
        return Err(ServiceError::rejected(format!(
            "Row {} has {} value(s), expected {expected}",
            idx + 1,
            row.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl SubmissionService for OutboxSubmissionSink {
    async fn submit(
        &self,
        form_id: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, ServiceError> {
        validate_payload(payload)?;
        let id = Uuid::new_v4().to_string();
        let path = self
            .dir
            .join(checked_id(form_id)?)
            .join(format!("{id}.json"));
        let record = OutboxRecord {
            id: &id,
            form_id,
            submitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            payload,
        };
        write_json(&path, &record).await?;
        Ok(SubmissionReceipt {
            success: true,
            message: Some(format!(
                "Saved {} row(s) for {}.",
                payload.data.len(),
                payload.name
            )),
            id: Some(id),
        })
    }
}

#[async_trait]
impl SubmissionLedger for OutboxSubmissionSink {
    async fn record_submission_ids(
        &self,
        source_id: &str,
        submission_ids: &[String],
    ) -> Result<(), ServiceError> {
        let path = self
            .dir
            .join("ledger")
            .join(format!("{}.json", checked_id(source_id)?));
        let mut ids: Vec<String> = match read_optional(&path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        ids.extend(submission_ids.iter().cloned());
        write_json(&path, &ids).await
    }
}
