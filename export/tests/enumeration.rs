mod common;

use common::*;
use export::files::list_data_files;
use export::store::StoreRole;
use export::store::memory::MemoryObjectStore;
use telemetry::tracing::init_test_tracing;

async fn seeded_store() -> MemoryObjectStore {
    let store = MemoryObjectStore::new(StoreRole::Source);
    for key in [
        "firefox/20200601/1",
        "firefox/20200601/export-1-abc-output-0",
        "other-prefix/20200601/export-1-abc-output-0",
        "firefox/20200601/export-2-dsaf-output-0",
        "firefox/20200602/export-1-abc-output-0",
        "firefox/20200601/export-3-abc-output-0.manifest",
    ] {
        store.insert(SOURCE_BUCKET, key, "{}").await;
    }

    store
}

#[tokio::test(flavor = "multi_thread")]
async fn only_well_formed_keys_of_the_prefix_and_date_are_listed() {
    init_test_tracing();

    let store = seeded_store().await;

    for page_size in [None, Some(1)] {
        let files = list_data_files(&store, &date(), SOURCE_BUCKET, PREFIX, page_size)
            .await
            .unwrap();

        assert_eq!(
            files,
            vec![
                "firefox/20200601/export-1-abc-output-0".to_string(),
                "firefox/20200601/export-2-dsaf-output-0".to_string(),
            ],
            "page size {page_size:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_listing_returns_no_files() {
    init_test_tracing();

    let store = MemoryObjectStore::new(StoreRole::Source);

    let files = list_data_files(&store, &date(), SOURCE_BUCKET, PREFIX, Some(1))
        .await
        .unwrap();

    assert!(files.is_empty());
}
