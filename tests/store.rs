mod common;

use std::sync::Arc;

use common::{TestWorkspace, mapping, table};
use form_bridge::model::{FieldMapping, PreparedSubmissionRow, TableData};
use form_bridge::reconcile::{ReconcileStatus, reconcile};
use form_bridge::service::{MappingService, SubmissionService};
use form_bridge::store::{JsonMappingStore, OutboxSubmissionSink};
use form_bridge::submit::{BatchState, SubmissionOrchestrator};
use serde_json::{Value, json};

#[tokio::test]
async fn missing_document_reads_as_no_mappings() {
    let ws = TestWorkspace::new();
    let store = JsonMappingStore::new(ws.path());
    assert!(store.lookup("conn-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_normalizes_and_assigns_ids() {
    let ws = TestWorkspace::new();
    let store = JsonMappingStore::new(ws.path().join("mappings"));
    let mut fresh = mapping("isolates", "F1", &["ID"], &["ID"]);
    fresh.id = None;
    let mut bare = mapping("wards", "F2", &[], &[]);
    bare.field_mappings.clear();
    let duplicate = mapping("ISOLATES", "F3", &[], &["x"]);

    let update = store
        .update("conn-1", &[fresh, bare, duplicate])
        .await
        .unwrap();

    assert!(update.success);
    assert_eq!(update.mappings.len(), 2);
    assert!(update.mappings[0].id.is_some());
    assert_eq!(update.mappings[1].field_mappings.len(), 1);
    assert_eq!(store.lookup("conn-1").await.unwrap(), update.mappings);
}

#[tokio::test]
async fn reconcile_round_trips_through_the_store() {
    let ws = TestWorkspace::new();
    ws.write(
        "conn-1.json",
        &json!({
            "formMappings": [{
                "_id": "m1",
                "name": "patients",
                "formId": {"id": "F1", "fields": [{"label": "ID"}, {"label": "Name"}]},
                "fieldMappings": [{"fields": ["id", "name"]}]
            }]
        })
        .to_string(),
    );
    let store = JsonMappingStore::new(ws.path());
    let persisted = store.lookup("conn-1").await.unwrap();
    let tables = vec![table("patients", vec![]), table("isolates", vec![])];

    let result = reconcile(&store, "conn-1", &tables, persisted).await;

    assert!(matches!(result.status, ReconcileStatus::Persisted { .. }));
    let stored: Vec<FieldMapping> = store.lookup("conn-1").await.unwrap();
    assert_eq!(stored, result.mappings);
    assert_eq!(stored[1].name, "isolates");
    assert_eq!(stored[1].field_mappings[0].fields, vec!["ID"]);
}

#[tokio::test]
async fn outbox_writes_payloads_and_ledger() {
    let ws = TestWorkspace::new();
    let outbox = Arc::new(OutboxSubmissionSink::new(ws.path()));
    let row = PreparedSubmissionRow {
        form_id: "F1".into(),
        script_name: "patients".into(),
        field_keys: vec!["ID".into()],
        uploaded_column_keys: vec!["id".into()],
        all_column_keys: vec!["id".into()],
        values: common::row(json!({"ID": "7"})),
    };
    let mut data = TableData::new();
    data.insert("patients".into(), vec![row]);

    let summary = SubmissionOrchestrator::new(outbox.clone(), "conn-1")
        .with_ledger(outbox)
        .submit(&data)
        .await
        .unwrap();

    assert_eq!(summary.state(), BatchState::AllSucceeded);
    let id = summary.outcomes[0].submission_id.clone().unwrap();
    let written: Value = serde_json::from_str(
        &std::fs::read_to_string(ws.path().join("F1").join(format!("{id}.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(written["data"], json!([["7"]]));
    assert_eq!(written["form_id"], json!("F1"));
    let ledger: Vec<String> = serde_json::from_str(
        &std::fs::read_to_string(ws.path().join("ledger").join("conn-1.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(ledger, vec![id]);
}

#[tokio::test]
async fn outbox_rejects_unsafe_form_ids() {
    let ws = TestWorkspace::new();
    let outbox = OutboxSubmissionSink::new(ws.path());
    let payload = form_bridge::service::SubmissionPayload {
        data: vec![vec![json!(1)]],
        name: "t".into(),
        field_keys: vec!["a".into()],
        uploaded_column_keys: Vec::new(),
        all_column_keys: Vec::new(),
    };

    let err = outbox.submit("../escape", &payload).await.unwrap_err();

    assert_eq!(err.server_message(), Some("Invalid identifier '../escape'"));
}
