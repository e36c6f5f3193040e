mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::{CONTACTS_CSV, ManualClock, ScriptedBulkApi, TestWorkspace};
use csv_bulkload::bulk::{JobState, JobStatus, Operation, OutcomeStatus, PollPolicy};
use csv_bulkload::config::IngestConfig;
use csv_bulkload::error::{IngestError, IngestResult};
use csv_bulkload::schema::{FieldCatalog, FileCatalog, SchemaApi, TargetField};
use csv_bulkload::session::UploadSession;
use csv_bulkload::suggest::FieldSuggestion;

fn catalog_file(workspace: &TestWorkspace) -> std::path::PathBuf {
    let path = workspace.path().join("contact.yaml");
    common::contact_catalog().save(&path).expect("save catalog");
    path
}

#[tokio::test(flavor = "current_thread")]
async fn full_pipeline_uploads_normalized_payload() {
    let workspace = TestWorkspace::new();
    let schema = FileCatalog::open(&catalog_file(&workspace)).expect("open catalog");
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.load_text(CONTACTS_CSV).expect("load");
    session.refresh_fields(&schema).await.expect("describe");
    assert_eq!(session.auto_map().expect("auto map"), 5);
    session.validate().expect("valid mapping");

    let api = ScriptedBulkApi::new(vec![
        JobStatus::new(JobState::InProgress, 0, 0),
        JobStatus::new(JobState::JobComplete, 2, 0),
    ]);
    let clock = ManualClock::default();
    let outcome = session
        .upload(&api, &clock)
        .await
        .expect("upload");

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    assert_eq!(
        api.uploaded.lock().unwrap().as_deref(),
        Some(
            "FirstName,LastName,Email,Phone,MailingCity\n\
             Ada,Lovelace,ada@example.com,+442079460958,London\n\
             Grace,Hopper,grace@example.com,5551234567,Arlington\n"
        )
    );
    assert_eq!(
        session.last_job().map(|job| job.state.clone()),
        Some(JobState::JobComplete)
    );
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_mapping_blocks_upload_before_submit() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.set_fields(common::contact_fields());
    session.load_text(CONTACTS_CSV).expect("load");
    session.mapping_mut().assign("fname", "FirstName");

    let api = ScriptedBulkApi::always(JobState::JobComplete);
    let clock = ManualClock::default();
    let err = session
        .upload(&api, &clock)
        .await
        .unwrap_err();
    match err {
        IngestError::Mapping(mapping) => {
            assert_eq!(mapping.missing_required(), vec!["LastName"])
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(api.calls().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn upload_without_document_is_a_state_error() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    let api = ScriptedBulkApi::always(JobState::JobComplete);
    let clock = ManualClock::default();
    let err = session
        .upload(&api, &clock)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::State(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn configured_poll_policy_bounds_the_upload() {
    let config = IngestConfig {
        object: "Contact".to_string(),
        operation: Operation::Upsert,
        poll: PollPolicy {
            interval_secs: 5,
            max_attempts: 2,
        },
    };
    let mut session = UploadSession::from_config(&config);
    assert_eq!(session.operation(), Operation::Upsert);
    session.set_fields(common::contact_fields());
    session.load_text(CONTACTS_CSV).expect("load");
    session.auto_map().expect("auto map");

    let api = ScriptedBulkApi::always(JobState::InProgress);
    let clock = ManualClock::default();
    let err = session.upload(&api, &clock).await.unwrap_err();
    assert!(matches!(err, IngestError::Timeout { attempts: 2, .. }));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
    assert_eq!(api.calls()[0], "submit Contact upsert");
}

#[test]
fn loading_a_new_file_replaces_document_and_mapping() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.load_text("a,b\n1,2\n").expect("load first");
    session.mapping_mut().assign("a", "LastName");

    session.load_text("c\n3\n").expect("load second");
    assert!(session.mapping().is_empty());
    assert_eq!(session.document().map(|d| d.headers().to_vec()), Some(vec!["c".to_string()]));
}

#[test]
fn failed_parse_keeps_previous_state() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.load_text("a,b\n1,2\n").expect("load first");
    session.mapping_mut().assign("a", "LastName");

    assert!(session.load_text("   ").is_err());
    assert_eq!(session.mapping().target("a"), Some("LastName"));
    assert_eq!(session.document().map(|d| d.row_count()), Some(1));
}

#[test]
fn auto_map_skips_read_only_fields_for_insert() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.set_fields(common::contact_fields());
    session.load_text("Id,Last Name\n003xx,Hopper\n").expect("load");
    session.auto_map().expect("auto map");
    assert_eq!(session.mapping().target("Id"), None);
    assert_eq!(session.mapping().target("Last Name"), Some("LastName"));
}

#[tokio::test(flavor = "current_thread")]
async fn created_fields_become_mappable() {
    let workspace = TestWorkspace::new();
    let path = catalog_file(&workspace);
    let schema = FileCatalog::open(&path).expect("open catalog");
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.load_text(CONTACTS_CSV).expect("load");
    session.refresh_fields(&schema).await.expect("describe");
    session.auto_map().expect("auto map");

    let suggestions = session.field_suggestions().expect("suggestions");
    let report = session.create_fields(&schema, &suggestions).await;
    assert_eq!(report.created, vec!["Shoe_Size__c"]);
    assert!(report.is_complete());
    assert!(report.refresh_error.is_none());
    assert!(session.fields().iter().any(|f| f.name == "Shoe_Size__c"));

    let saved = FieldCatalog::load(&path).expect("reload catalog");
    assert!(saved.field("Shoe_Size__c").is_some());

    session.auto_map().expect("auto map again");
    assert_eq!(session.mapping().target("Shoe Size"), Some("Shoe_Size__c"));
}

struct FlakySchema;

#[async_trait]
impl SchemaApi for FlakySchema {
    async fn list_fields(&self, _object: &str) -> IngestResult<Vec<TargetField>> {
        Err(IngestError::transport(
            csv_bulkload::error::Step::ListFields,
            "503 service unavailable",
        ))
    }

    async fn create_field(&self, _object: &str, suggestion: &FieldSuggestion) -> IngestResult<()> {
        if suggestion.developer_name.starts_with('B') {
            Err(IngestError::Schema("duplicate developer name".to_string()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn describe_failures_surface_as_schema_errors() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    let err = session.refresh_fields(&FlakySchema).await.unwrap_err();
    assert!(matches!(err, IngestError::Schema(ref msg) if msg.contains("503")));
}

#[tokio::test(flavor = "current_thread")]
async fn partial_field_creation_failures_are_collected() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.load_text("Alpha,Beta,Gamma\n1,2,3\n").expect("load");
    let suggestions = session.field_suggestions().expect("suggestions");
    assert_eq!(suggestions.len(), 3);

    let report = csv_bulkload::suggest::create_fields(&FlakySchema, "Contact", &suggestions).await;
    assert_eq!(report.created, vec!["Alpha__c", "Gamma__c"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Beta__c");
}

#[tokio::test(flavor = "current_thread")]
async fn failed_refresh_after_creation_keeps_the_report() {
    let mut session = UploadSession::new("Contact", Operation::Insert);
    session.load_text("Alpha,Beta\n1,2\n").expect("load");
    let suggestions = session.field_suggestions().expect("suggestions");

    let report = session.create_fields(&FlakySchema, &suggestions).await;
    assert_eq!(report.created, vec!["Alpha__c"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Beta__c");
    assert!(matches!(
        report.refresh_error,
        Some(IngestError::Schema(ref msg)) if msg.contains("503")
    ));
    assert!(session.fields().is_empty());
}
