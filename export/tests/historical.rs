mod common;

use common::*;
use export::error::ErrorKind;
use export::types::RecordType;
use export::vendor::{ExportJobStatus, ExportState};
use telemetry::tracing::init_test_tracing;

const SESSIONS_URL: &str = "https://export.example.com/files/export-5861-20200601-output-sessions-0";
const EXPERIMENTS_URL: &str =
    "https://export.example.com/files/export-5861-20200601-output-experiments-0?token=abc";

fn running() -> ExportJobStatus {
    ExportJobStatus {
        state: ExportState::Running,
        files: Vec::new(),
    }
}

fn finished(files: &[&str]) -> ExportJobStatus {
    ExportJobStatus {
        state: ExportState::Finished,
        files: files.iter().map(|file| file.to_string()).collect(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn historical_export_reshapes_stages_and_loads() {
    init_test_tracing();

    let env = TestEnv::new();
    env.api.push_status(running()).await;
    env.api
        .push_status(finished(&[SESSIONS_URL, EXPERIMENTS_URL]))
        .await;
    env.api
        .insert_file(
            SESSIONS_URL,
            "country,sessionId,lat,unknownField\nUS,1,37.7,x\nDE,2,52.5,y\n",
        )
        .await;
    env.api
        .insert_file(
            EXPERIMENTS_URL,
            "variantId,experimentId,sessionId\n12,11,1\n",
        )
        .await;
    let stale = layout().staged_key(RecordType::Sessions, "old.csv");
    env.staging
        .insert(STAGING_BUCKET, &stale, "sessionId\n9\n")
        .await;

    let summary = env.historical_exporter().run().await.unwrap();

    assert_eq!(env.api.started().await, vec![date()]);
    assert_eq!(env.api.status_polls().await, 2);
    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_transformed, 2);
    assert_eq!(summary.rows_for(RecordType::Sessions), 2);
    assert_eq!(summary.rows_for(RecordType::Experiments), 1);

    let staged_key = layout().staged_key(
        RecordType::Experiments,
        "export-5861-20200601-output-experiments-0.csv",
    );
    let staged = env.staging.get(STAGING_BUCKET, &staged_key).await.unwrap();
    assert_eq!(
        staged.as_ref(),
        b"sessionId,experimentId,variantId\n1,11,12\n".as_slice()
    );
    assert!(!env.staged_keys().await.contains(&stale));

    let staged_keys = env.staged_keys().await;
    assert!(
        !staged_keys.contains(&layout().staged_key(RecordType::Sessions, "sessions-empty.csv"))
    );
    let sessions = destination(RecordType::Sessions);
    assert_eq!(env.warehouse.partition_rows(&sessions, &date()).await.len(), 2);
    assert_eq!(
        env.warehouse
            .partition_rows(&destination(RecordType::Events), &date())
            .await
            .len(),
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unexpected_file_url_fails_before_staging() {
    init_test_tracing();

    let env = TestEnv::new();
    env.api
        .push_status(finished(&["https://export.example.com/files/report.zip"]))
        .await;
    let staged = layout().staged_key(RecordType::Sessions, "kept.csv");
    env.staging
        .insert(STAGING_BUCKET, &staged, "sessionId\n9\n")
        .await;

    let err = env.historical_exporter().run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidExportFileUrl);
    assert!(env.staged_keys().await.contains(&staged));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_vendor_export_is_reported() {
    init_test_tracing();

    let env = TestEnv::new();
    env.api
        .push_status(ExportJobStatus {
            state: ExportState::Failed,
            files: Vec::new(),
        })
        .await;

    let err = env.historical_exporter().run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VendorExportFailed);
}

#[tokio::test(flavor = "multi_thread")]
async fn record_types_without_export_files_get_header_only_files() {
    init_test_tracing();

    let env = TestEnv::new();
    env.api.push_status(finished(&[SESSIONS_URL])).await;
    env.api
        .insert_file(SESSIONS_URL, "sessionId,country\n1,US\n")
        .await;

    let summary = env.historical_exporter().run().await.unwrap();

    assert_eq!(summary.files_seen, 1);
    assert_eq!(summary.loaded.len(), RecordType::ALL.len());
    for record_type in RecordType::ALL {
        if record_type == RecordType::Sessions {
            continue;
        }

        let key = layout().staged_key(record_type, &format!("{record_type}-empty.csv"));
        let staged = env.staging.get(STAGING_BUCKET, &key).await.unwrap();
        let header: Vec<&str> = env.registry.schema(record_type).column_names().collect();
        assert_eq!(
            String::from_utf8_lossy(&staged),
            format!("{}\n", header.join(","))
        );
        assert!(
            env.warehouse
                .partition_rows(&destination(record_type), &date())
                .await
                .is_empty()
        );
    }
    assert_eq!(
        env.warehouse
            .partition_rows(&destination(RecordType::Sessions), &date())
            .await
            .len(),
        1
    );
}
