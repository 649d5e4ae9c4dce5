#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use form_bridge::error::ServiceError;
use form_bridge::model::{FieldBinding, FieldMapping, FormField, Row, Table, TargetForm};
use form_bridge::service::{
    MappingService, MappingUpdate, SubmissionLedger, SubmissionPayload, SubmissionReceipt,
    SubmissionService,
};
use serde_json::Value;
use tempfile::{TempDir, tempdir};

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

pub fn table(name: &str, rows: Vec<Value>) -> Table {
    Table::new(name, rows.into_iter().map(row).collect())
}

/// Mapping routed to `form_id` with the given form labels and bound columns.
pub fn mapping(name: &str, form_id: &str, labels: &[&str], fields: &[&str]) -> FieldMapping {
    FieldMapping {
        id: Some(format!("{name}-id")),
        name: name.to_string(),
        form: TargetForm {
            id: form_id.to_string(),
            fields: labels.iter().map(|l| FormField::labelled(*l)).collect(),
            ..TargetForm::default()
        },
        field_mappings: vec![FieldBinding::with_fields(
            fields.iter().map(|f| f.to_string()).collect(),
        )],
        ..FieldMapping::default()
    }
}

pub enum UpdateBehaviour {
    /// Echo the candidates back, stamping ids on new mappings.
    Accept,
    Refuse,
    Fail,
}

/// In-memory mapping service recording every update it receives.
pub struct MockMappingService {
    behaviour: UpdateBehaviour,
    pub updates: Mutex<Vec<Vec<FieldMapping>>>,
}

impl MockMappingService {
    pub fn new(behaviour: UpdateBehaviour) -> Self {
        Self {
            behaviour,
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl MappingService for MockMappingService {
    async fn lookup(&self, _source_id: &str) -> Result<Vec<FieldMapping>, ServiceError> {
        Ok(Vec::new())
    }

    async fn update(
        &self,
        _source_id: &str,
        mappings: &[FieldMapping],
    ) -> Result<MappingUpdate, ServiceError> {
        self.updates.lock().unwrap().push(mappings.to_vec());
        match self.behaviour {
            UpdateBehaviour::Accept => {
                let mappings = mappings
                    .iter()
                    .cloned()
                    .map(|mut m| {
                        m.id.get_or_insert_with(|| format!("server-{}", m.name));
                        m
                    })
                    .collect();
                Ok(MappingUpdate {
                    success: true,
                    mappings,
                })
            }
            UpdateBehaviour::Refuse => Ok(MappingUpdate {
                success: false,
                mappings: Vec::new(),
            }),
            UpdateBehaviour::Fail => Err(ServiceError::Unavailable("connection refused".into())),
        }
    }
}

pub enum FormBehaviour {
    Accept,
    Reject(Option<String>),
    Unreachable,
    /// Accept after a delay, so siblings settle first.
    SlowAccept(Duration),
    Panic,
}

/// Submission service keyed by form id; unknown forms accept.
pub struct MockSubmissionService {
    forms: HashMap<String, FormBehaviour>,
    pub calls: Mutex<Vec<(String, SubmissionPayload)>>,
}

impl MockSubmissionService {
    pub fn new(forms: Vec<(&str, FormBehaviour)>) -> Self {
        Self {
            forms: forms
                .into_iter()
                .map(|(id, behaviour)| (id.to_string(), behaviour))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for(&self, form_id: &str) -> Vec<SubmissionPayload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == form_id)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SubmissionService for MockSubmissionService {
    async fn submit(
        &self,
        form_id: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((form_id.to_string(), payload.clone()));
        let accepted = SubmissionReceipt {
            success: true,
            message: None,
            id: Some(format!("sub-{form_id}")),
        };
        match self.forms.get(form_id) {
            None | Some(FormBehaviour::Accept) => Ok(accepted),
            Some(FormBehaviour::SlowAccept(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(accepted)
            }
            Some(FormBehaviour::Reject(message)) => Err(ServiceError::Rejected {
                message: message.clone(),
            }),
            Some(FormBehaviour::Unreachable) => {
                Err(ServiceError::Unavailable("timed out".into()))
            }
            Some(FormBehaviour::Panic) => panic!("submission handler crashed"),
        }
    }
}

#[derive(Default)]
pub struct MockLedger {
    pub recorded: Mutex<Vec<(String, Vec<String>)>>,
    pub fail: bool,
}

#[async_trait]
impl SubmissionLedger for MockLedger {
    async fn record_submission_ids(
        &self,
        source_id: &str,
        submission_ids: &[String],
    ) -> Result<(), ServiceError> {
        self.recorded
            .lock()
            .unwrap()
            .push((source_id.to_string(), submission_ids.to_vec()));
        if self.fail {
            return Err(ServiceError::Unavailable("ledger offline".into()));
        }
        Ok(())
    }
}

/// Scratch directory that cleans up on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file");
        path
    }
}
