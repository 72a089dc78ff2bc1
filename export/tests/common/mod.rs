#![allow(dead_code)]

use export::driver::{
    ExportRun, Exporter, HistoricalExporter, HistoricalOptions, MessagesExporter, StreamExporter,
    StreamOptions,
};
use export::loader::{LoadTarget, WarehouseLoader};
use export::schema::SchemaRegistry;
use export::store::StoreRole;
use export::store::memory::MemoryObjectStore;
use export::store::paths::StagingLayout;
use export::types::{LogicalDate, RecordType};
use export::vendor::memory::MemoryExportApi;
use export::warehouse::TableRef;
use export::warehouse::memory::MemoryWarehouse;
use export::warehouse::naming::{destination_table, messages_table};
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_BUCKET: &str = "vendor-stream";
pub const STAGING_BUCKET: &str = "staging";
pub const PREFIX: &str = "firefox";
pub const DATASET: &str = "leanplum";
pub const VERSION: u32 = 1;

pub type TestExporter =
    Exporter<MemoryObjectStore, MemoryObjectStore, MemoryWarehouse, MemoryExportApi>;

/// Reads a file of `tests/fixtures`.
pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|err| panic!("reading {path}: {err}"))
}

pub fn date() -> LogicalDate {
    "20200601".parse().unwrap()
}

pub fn layout() -> StagingLayout {
    StagingLayout::new(PREFIX, VERSION, date())
}

/// Key of a data file the vendor streamed for the test date.
pub fn source_key(name: &str) -> String {
    format!("{PREFIX}/{}/{name}", date())
}

pub fn destination(record_type: RecordType) -> TableRef {
    destination_table(DATASET, None, record_type, VERSION)
}

pub fn messages_destination() -> TableRef {
    messages_table(DATASET, None, VERSION)
}

/// In-memory collaborators of an export run.
pub struct TestEnv {
    pub source: MemoryObjectStore,
    pub staging: MemoryObjectStore,
    pub warehouse: MemoryWarehouse,
    pub api: MemoryExportApi,
    pub registry: Arc<SchemaRegistry>,
}

impl TestEnv {
    pub fn new() -> Self {
        let staging = MemoryObjectStore::new(StoreRole::Staging);

        Self {
            source: MemoryObjectStore::new(StoreRole::Source),
            warehouse: MemoryWarehouse::new(staging.clone()),
            staging,
            api: MemoryExportApi::new("export-job-1"),
            registry: Arc::new(SchemaRegistry::bundled().unwrap()),
        }
    }

    /// Puts a data file into the source bucket.
    pub async fn seed_source(&self, name: &str, body: impl Into<bytes::Bytes>) -> String {
        let key = source_key(name);
        self.source.insert(SOURCE_BUCKET, &key, body).await;
        key
    }

    pub fn run(&self) -> ExportRun {
        ExportRun {
            date: date(),
            staging_bucket: STAGING_BUCKET.to_string(),
            prefix: PREFIX.to_string(),
            version: VERSION,
        }
    }

    pub fn loader(&self) -> WarehouseLoader<MemoryWarehouse> {
        let target = LoadTarget {
            staging_bucket: STAGING_BUCKET.to_string(),
            uri_scheme: "gs".to_string(),
            dataset: DATASET.to_string(),
            table_prefix: None,
            external_dataset: "tmp".to_string(),
            max_bad_records: 100,
        };

        WarehouseLoader::new(self.warehouse.clone(), Arc::clone(&self.registry), target)
    }

    pub fn stream_exporter(&self, clean: bool, max_concurrent_files: usize) -> TestExporter {
        let options = StreamOptions {
            source_bucket: SOURCE_BUCKET.to_string(),
            clean,
            max_concurrent_files,
            scratch_parent: None,
            page_size: Some(2),
        };

        Exporter::Stream(StreamExporter::new(
            self.source.clone(),
            self.staging.clone(),
            self.loader(),
            Arc::clone(&self.registry),
            self.run(),
            options,
        ))
    }

    pub fn historical_exporter(&self) -> TestExporter {
        let options = HistoricalOptions {
            poll_interval: Duration::from_millis(1),
            scratch_parent: None,
        };

        Exporter::Historical(HistoricalExporter::new(
            self.api.clone(),
            self.staging.clone(),
            self.loader(),
            Arc::clone(&self.registry),
            self.run(),
            options,
        ))
    }

    pub fn messages_exporter(
        &self,
    ) -> MessagesExporter<MemoryExportApi, MemoryObjectStore, MemoryWarehouse> {
        MessagesExporter::new(
            self.api.clone(),
            self.staging.clone(),
            self.loader(),
            self.run(),
        )
    }

    /// Keys of the staging bucket under the test date.
    pub async fn staged_keys(&self) -> Vec<String> {
        self.staging
            .objects_under(STAGING_BUCKET, &layout().date_root())
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }
}
