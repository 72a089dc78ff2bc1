mod common;

use bytes::Bytes;
use common::*;
use export::decompose::decompose;
use export::error::ErrorKind;
use export::ledger::ImportLedger;
use export::types::{RecordType, SessionRecord};
use export::warehouse::Warehouse;
use telemetry::tracing::init_test_tracing;

const FILE: &str = "export-1-abc-output-0";

#[tokio::test(flavor = "multi_thread")]
async fn second_fixture_record_decomposes_into_expected_rows() {
    init_test_tracing();

    let registry = TestEnv::new().registry;
    let fixture = fixture("sample.ndjson");
    let line = fixture.lines().nth(1).unwrap();
    let record: SessionRecord = serde_json::from_str(line).unwrap();

    let decomposed = decompose(&record, &registry.session_columns()).unwrap();

    assert_eq!(decomposed.user_attributes.len(), 2);
    assert_eq!(decomposed.experiments.len(), 3);
    assert_eq!(decomposed.sessions.len(), 1);
    assert_eq!(decomposed.events.len(), 5);
    assert_eq!(decomposed.event_parameters.len(), 4);
    assert!(decomposed.states.is_empty());
    assert!(
        decomposed
            .experiments
            .iter()
            .all(|experiment| experiment.session_id == 5011960683315201)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_export_stages_marks_and_loads() {
    init_test_tracing();

    let env = TestEnv::new();
    env.seed_source(FILE, fixture("sample.ndjson")).await;

    let summary = env.stream_exporter(false, 1).run().await.unwrap();

    assert_eq!(summary.files_seen, 1);
    assert_eq!(summary.files_skipped, 0);
    assert_eq!(summary.files_transformed, 1);
    assert_eq!(summary.rows_for(RecordType::UserAttributes), 3);
    assert_eq!(summary.rows_for(RecordType::Experiments), 4);
    assert_eq!(summary.rows_for(RecordType::Sessions), 2);
    assert_eq!(summary.rows_for(RecordType::Events), 6);
    assert_eq!(summary.rows_for(RecordType::EventParameters), 5);
    assert_eq!(summary.rows_for(RecordType::States), 0);

    let layout = layout();
    let staged = env.staged_keys().await;
    for record_type in RecordType::ALL {
        let key = layout.staged_key(record_type, &format!("{record_type}-abc-output-0.csv"));
        assert!(staged.contains(&key), "missing {key}");
    }
    assert!(staged.contains(&layout.marker_key(FILE)));

    let sessions = destination(RecordType::Sessions);
    let columns = env.warehouse.table_columns(&sessions).await.unwrap();
    assert!(!columns.iter().any(|column| column == "lat" || column == "lon"));
    assert_eq!(env.warehouse.partition_rows(&sessions, &date()).await.len(), 2);
    assert_eq!(
        env.warehouse
            .partition_rows(&destination(RecordType::Events), &date())
            .await
            .len(),
        6
    );
    assert!(env.warehouse.table_exists(&destination(RecordType::States)).await.unwrap());
    assert!(env.warehouse.external_tables().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_counter_is_left_to_the_bad_record_limit() {
    init_test_tracing();

    let env = TestEnv::new();
    let valid = fixture("sample.ndjson").lines().next().unwrap().to_string();
    let malformed = r#"{"sessionId":"1","priorEvents":1.5}"#;
    env.seed_source(FILE, format!("{malformed}\n{valid}\n")).await;

    let summary = env.stream_exporter(false, 1).run().await.unwrap();

    assert_eq!(summary.files_transformed, 1);
    assert_eq!(summary.rows_for(RecordType::Sessions), 2);

    let key = layout().staged_key(RecordType::Sessions, "sessions-abc-output-0.csv");
    let staged = env.staging.get(STAGING_BUCKET, &key).await.unwrap();
    assert!(String::from_utf8_lossy(&staged).contains(",1.5,"));

    let sessions = destination(RecordType::Sessions);
    let rows = env.warehouse.partition_rows(&sessions, &date()).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "5011960683315200");
}

#[tokio::test(flavor = "multi_thread")]
async fn imported_files_are_not_transformed_again() {
    init_test_tracing();

    let env = TestEnv::new();
    let done = env.seed_source(FILE, fixture("sample.ndjson")).await;
    let pending = env
        .seed_source("export-1-def-output-1", fixture("sample.ndjson"))
        .await;
    ImportLedger::new(env.staging.clone(), STAGING_BUCKET, layout())
        .mark_imported(FILE)
        .await
        .unwrap();

    let summary = env.stream_exporter(false, 1).run().await.unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_transformed, 1);
    let downloads = env.source.downloads().await;
    assert_eq!(downloads, vec![pending]);
    assert!(!downloads.contains(&done));
}

#[tokio::test(flavor = "multi_thread")]
async fn rerunning_a_date_keeps_one_copy_of_the_data() {
    init_test_tracing();

    let env = TestEnv::new();
    env.seed_source(FILE, fixture("sample.ndjson")).await;

    env.stream_exporter(false, 1).run().await.unwrap();
    let summary = env.stream_exporter(false, 1).run().await.unwrap();

    assert_eq!(summary.files_skipped, 1);
    assert!(summary.loaded.iter().all(|table| !table.created));
    assert_eq!(
        env.warehouse
            .partition_rows(&destination(RecordType::Sessions), &date())
            .await
            .len(),
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_run_discards_staged_output_and_ledger() {
    init_test_tracing();

    let env = TestEnv::new();
    env.seed_source(FILE, fixture("sample.ndjson")).await;
    let layout = layout();
    let stale = layout.staged_key(RecordType::Sessions, "sessions-stale.csv");
    env.staging
        .insert(STAGING_BUCKET, &stale, Bytes::from_static(b"sessionId\n1\n"))
        .await;
    ImportLedger::new(env.staging.clone(), STAGING_BUCKET, layout.clone())
        .mark_imported(FILE)
        .await
        .unwrap();

    let summary = env.stream_exporter(true, 1).run().await.unwrap();

    assert_eq!(summary.files_skipped, 0);
    assert_eq!(summary.files_transformed, 1);
    let staged = env.staged_keys().await;
    assert!(!staged.contains(&stale));
    assert!(staged.contains(&layout.marker_key(FILE)));
    assert_eq!(
        env.warehouse
            .partition_rows(&destination(RecordType::Sessions), &date())
            .await
            .len(),
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_files_are_reported_together_and_skip_the_load() {
    init_test_tracing();

    let env = TestEnv::new();
    env.seed_source(FILE, fixture("sample.ndjson")).await;
    env.seed_source("export-1-bad-output-1", "{\"sessionId\": 1}\n{not json\n")
        .await;
    env.seed_source("export-1-nosession-output-2", "{\"userId\": \"a\"}\n")
        .await;

    let err = env.stream_exporter(false, 3).run().await.unwrap_err();

    let mut kinds = err.kinds();
    kinds.sort_by_key(|kind| format!("{kind:?}"));
    assert_eq!(
        kinds,
        vec![ErrorKind::DeserializationError, ErrorKind::InvalidData]
    );

    let imported = ImportLedger::new(env.staging.clone(), STAGING_BUCKET, layout())
        .already_imported()
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert!(imported.contains(FILE));
    assert!(
        !env.warehouse
            .table_exists(&destination(RecordType::Sessions))
            .await
            .unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_workers_transform_every_file() {
    init_test_tracing();

    let env = TestEnv::new();
    for index in 0..4 {
        env.seed_source(
            &format!("export-1-part{index}-output-{index}"),
            fixture("sample.ndjson"),
        )
        .await;
    }

    let summary = env.stream_exporter(false, 2).run().await.unwrap();

    assert_eq!(summary.files_transformed, 4);
    assert_eq!(summary.rows_for(RecordType::Sessions), 8);
    assert_eq!(
        env.warehouse
            .partition_rows(&destination(RecordType::Sessions), &date())
            .await
            .len(),
        8
    );
}
