//! Library integration tests driving the store through its public traits.

use std::sync::Arc;

use chrono::{Duration, Utc};
use gdc_models::config::DatabaseConfig;
use gdc_models::error::{ConstraintKind, Error};
use gdc_models::store::{
    BatchStore, CohortStore, EntitySetStore, NotificationStore, ReleasedDataStore, SqliteStore,
    Store, StudyRuleStore, SubmissionStore, Target, migrations,
};
use gdc_models::types::*;
use serde_json::json;
use tempfile::TempDir;

fn open(temp: &TempDir) -> SqliteStore {
    let config = DatabaseConfig::new(temp.path().join("models.db"));
    let store = SqliteStore::open(&config).unwrap();
    store.initialize().unwrap();
    store
}

#[test]
fn test_store_is_usable_as_trait_object() {
    let temp = TempDir::new().unwrap();
    let store: Arc<dyn Store> = Arc::new(open(&temp));

    let set = EntitySet::new(
        "shared",
        SetType::Frozen,
        EntityType::Gene,
        vec!["ENSG00000141510".to_string()],
    );
    store.create_entity_set(&set).unwrap();

    let handle = Arc::clone(&store);
    let fetched = std::thread::spawn(move || handle.get_entity_set("shared").unwrap())
        .join()
        .unwrap();
    assert_eq!(fetched.unwrap().entity_ids.len(), 1);
}

#[test]
fn test_cohort_lifecycle() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    let context = store
        .create_anonymous_context(&AnonymousContext::new("anon"))
        .unwrap();
    let cohort = store
        .create_cohort(&Cohort::new("my cohort", context.id))
        .unwrap();

    let first = store
        .append_cohort_filter(cohort.id, &json!({"op": "and", "content": []}), CohortType::Static)
        .unwrap();
    let second = store
        .append_cohort_filter(
            cohort.id,
            &json!({"op": "in", "content": {"field": "cases.project.project_id", "value": ["TCGA-BRCA"]}}),
            CohortType::Dynamic,
        )
        .unwrap();
    assert_eq!(second.parent_id, first.id);

    let current = store.get_current_filter(cohort.id).unwrap().unwrap();
    assert_eq!(current.id, second.id);
    assert_eq!(store.filter_history(cohort.id).unwrap().len(), 2);

    assert!(store.delete_anonymous_context(context.id).unwrap());
    assert!(store.get_cohort(cohort.id).unwrap().is_none());
    assert!(store.get_cohort_filter(first.id.unwrap()).unwrap().is_none());
}

#[test]
fn test_batch_membership_after_node_type_revision() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    let mut batch = Batch::new("batch", "TCGA-BRCA");
    batch.members.push(BatchMembership::new(0, "node-1", "aliquot"));
    let batch = store.create_batch(&batch).unwrap();
    assert_eq!(batch.id, Some(1000));

    let members = store.list_batch_members(1000).unwrap();
    assert_eq!(members[0].node_type, "aliquot");
    assert_eq!(members[0].batch_id, 1000);
}

#[test]
fn test_release_bookkeeping() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    let data = ReleasedData::new("TCGA", "BRCA", "cnv", true, true).unwrap();
    store.upsert_released_data(&data).unwrap();
    store
        .append_release_log(
            &ReleasedDataLog::new("TCGA", "BRCA", "32.0", "cnv", true, "release").unwrap(),
        )
        .unwrap();

    assert!(ReleasedData::new("TCGA", "BRCA", "xml", true, true).is_err());
    assert_eq!(store.list_released_data("TCGA-BRCA").unwrap().len(), 1);
    assert_eq!(
        store
            .latest_release_log("TCGA-BRCA", ReleasedDataType::Cnv)
            .unwrap()
            .unwrap()
            .release_number,
        "32.0"
    );
}

#[test]
fn test_study_rule_coverage() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    let mut rule = StudyRule::new("controlled-access");
    rule.whole_programs.push(StudyRuleProgram::new(0, "TARGET"));
    let rule = store.create_study_rule(&rule).unwrap();
    store
        .add_study_rule_program_project(rule.id.unwrap(), "TCGA", "BRCA")
        .unwrap();

    let loaded = store.get_study_rule_by_name("controlled-access").unwrap().unwrap();
    assert!(loaded.covers("TARGET", "AML"));
    assert!(loaded.covers("TCGA", "BRCA"));
    assert!(!loaded.covers("TCGA", "LUAD"));
}

#[test]
fn test_submission_projection() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    let mut log = TransactionLog::new("create", "TCGA", "BRCA", true, "SUCCEEDED")
        .with_submitter("user-1");
    log.entities.push(TransactionSnapshot::new(
        "node-1",
        "create",
        json!({}),
        json!({"submitter_id": "case-1"}),
    ));
    let created = store.create_transaction_log(&log).unwrap();

    let fetched = store.get_transaction_log(created.id.unwrap()).unwrap().unwrap();
    let doc = fetched
        .to_json(&["id", "entities.id", "entities.action"])
        .unwrap();
    assert_eq!(
        doc,
        json!({
            "id": created.id,
            "entities": [{"id": "node-1", "action": "create"}],
        })
    );

    let err = fetched.to_json(&["bogus"]).unwrap_err();
    assert!(matches!(err, Error::UnknownFields { .. }));
}

#[test]
fn test_notification_window_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let now = Utc::now();
    {
        let store = open(&temp);
        store
            .create_notification(
                &Notification::new("upcoming", "INFO")
                    .with_window(Some(now + Duration::days(1)), None),
            )
            .unwrap();
    }

    let store = open(&temp);
    assert!(store.list_active_notifications(now).unwrap().is_empty());
    assert_eq!(
        store
            .list_active_notifications(now + Duration::days(2))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_downgrade_then_upgrade_round_trip() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);
    store.create_batch(&Batch::new("kept", "TCGA-BRCA")).unwrap();

    let reverted = store.downgrade_to(&Target::Revision("3f2a9c4d1b70".to_string())).unwrap();
    assert_eq!(reverted.len(), 2);

    let applied = store.upgrade_to(&Target::Head).unwrap();
    assert_eq!(applied.len(), 2);
    assert_eq!(store.current_revision().unwrap().as_deref(), Some(migrations::head()));
    assert_eq!(store.get_batch(1000).unwrap().unwrap().name, "kept");
}

#[test]
fn test_constraint_names_surface_through_public_error() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp);

    let member = BatchMembership::new(4242, "node-1", "case");
    let err = store.add_batch_member(&member).unwrap_err();
    let violation = err.integrity().expect("integrity error");
    assert!(violation.is(ConstraintKind::ForeignKey));
    assert_eq!(violation.constraint(), Some("batch_membership_batch_id_fk"));
    assert!(err.to_string().contains("batch_membership_batch_id_fk"));
}
