mod common;

use common::{MockMappingService, UpdateBehaviour, mapping, table};
use form_bridge::model::FieldBinding;
use form_bridge::reconcile::{ReconcileStatus, UnchangedReason, reconcile};
use serde_json::json;

#[tokio::test]
async fn clones_template_for_unseen_table_and_adopts_server_answer() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let tables = vec![
        table("patients", vec![json!({"id": 1, "name": "Ama"})]),
        table("isolates", vec![json!({"organism": "E. coli"})]),
    ];
    let persisted = vec![mapping("patients", "F1", &["ID", "Name"], &["id", "name"])];

    let result = reconcile(&service, "conn-1", &tables, persisted.clone()).await;

    assert_eq!(
        result.status,
        ReconcileStatus::Persisted {
            synthesized: vec!["isolates".to_string()]
        }
    );
    assert_eq!(result.mappings.len(), 2);
    assert_eq!(result.mappings[0], persisted[0]);
    let isolates = &result.mappings[1];
    assert_eq!(isolates.name, "isolates");
    assert_eq!(isolates.target_form_id(), "F1");
    assert_eq!(isolates.field_mappings, vec![FieldBinding::with_fields(vec!["ID".into()])]);
    assert_eq!(isolates.id.as_deref(), Some("server-isolates"));

    let sent = service.updates.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][1].id, None);
    assert!(result.warning().is_none());
}

#[tokio::test]
async fn name_match_is_case_insensitive_and_keeps_existing_mapping() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let persisted = vec![mapping("Patients", "F1", &["ID"], &["id", "name"])];
    let tables = vec![table("PATIENTS", vec![])];

    let result = reconcile(&service, "conn-1", &tables, persisted.clone()).await;

    assert_eq!(result.mappings, persisted);
    assert_eq!(
        result.status,
        ReconcileStatus::Unchanged(UnchangedReason::AlreadyAligned)
    );
    assert_eq!(service.update_count(), 0);
}

#[tokio::test]
async fn nothing_persisted_means_nothing_to_reconcile() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let tables = vec![table("patients", vec![json!({"id": 1})])];

    let result = reconcile(&service, "conn-1", &tables, Vec::new()).await;

    assert!(result.mappings.is_empty());
    assert_eq!(
        result.status,
        ReconcileStatus::Unchanged(UnchangedReason::NoPersistedMappings)
    );
    assert_eq!(service.update_count(), 0);
}

#[tokio::test]
async fn empty_discovery_returns_persisted_set() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let persisted = vec![mapping("patients", "F1", &["ID"], &["id"])];

    let result = reconcile(&service, "conn-1", &[], persisted.clone()).await;

    assert_eq!(result.mappings, persisted);
    assert_eq!(result.status, ReconcileStatus::Unchanged(UnchangedReason::NoTables));
}

#[tokio::test]
async fn no_template_is_a_quiet_noop() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let persisted = vec![mapping("patients", "F1", &["ID"], &[])];
    let tables = vec![table("isolates", vec![])];

    let result = reconcile(&service, "conn-1", &tables, persisted.clone()).await;

    assert_eq!(result.mappings, persisted);
    assert_eq!(result.status, ReconcileStatus::Unchanged(UnchangedReason::NoTemplate));
    assert_eq!(service.update_count(), 0);
}

#[tokio::test]
async fn failed_persist_falls_back_to_local_set_with_warning() {
    for behaviour in [UpdateBehaviour::Fail, UpdateBehaviour::Refuse] {
        let service = MockMappingService::new(behaviour);
        let persisted = vec![mapping("patients", "F1", &["ID"], &["id"])];
        let tables = vec![table("patients", vec![]), table("isolates", vec![])];

        let result = reconcile(&service, "conn-1", &tables, persisted).await;

        assert_eq!(service.update_count(), 1);
        let names: Vec<_> = result.mappings.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["patients", "isolates"]);
        assert!(matches!(result.status, ReconcileStatus::LocalFallback { .. }));
        assert!(result.warning().unwrap().contains("may be lost"));
    }
}

#[tokio::test]
async fn mappings_for_absent_tables_are_never_dropped() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let persisted = vec![
        mapping("archive", "F9", &["Code"], &["code"]),
        mapping("patients", "F1", &["ID"], &["id"]),
    ];
    let tables = vec![table("patients", vec![]), table("isolates", vec![])];

    let result = reconcile(&service, "conn-1", &tables, persisted).await;

    let names: Vec<_> = result.mappings.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["patients", "isolates", "archive"]);
    // Template is the first valid mapping, not the first matching one.
    assert_eq!(result.mappings[1].target_form_id(), "F9");
    assert_eq!(result.mappings[1].field_mappings[0].fields, vec!["Code"]);
}

#[tokio::test]
async fn synthesized_fields_are_empty_when_template_form_has_no_fields() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let persisted = vec![mapping("patients", "F1", &[], &["id"])];
    let tables = vec![table("isolates", vec![])];

    let result = reconcile(&service, "conn-1", &tables, persisted).await;

    let isolates = result
        .mappings
        .iter()
        .find(|m| m.name == "isolates")
        .expect("synthesized mapping");
    assert_eq!(isolates.field_mappings.len(), 1);
    assert!(isolates.field_mappings[0].fields.is_empty());
}

#[tokio::test]
async fn case_variants_of_a_table_share_one_mapping() {
    let service = MockMappingService::new(UpdateBehaviour::Accept);
    let persisted = vec![mapping("patients", "F1", &["ID"], &["id"])];
    let tables = vec![
        table("patients", vec![]),
        table("Isolates", vec![]),
        table("isolates", vec![]),
        table("PATIENTS", vec![]),
    ];

    let result = reconcile(&service, "conn-1", &tables, persisted).await;

    assert_eq!(
        result.status,
        ReconcileStatus::Persisted {
            synthesized: vec!["Isolates".to_string()]
        }
    );
    let sent = service.updates.lock().unwrap();
    let names: Vec<&str> = sent[0].iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["patients", "Isolates"]);
    assert_eq!(result.mappings.len(), 2);
}
