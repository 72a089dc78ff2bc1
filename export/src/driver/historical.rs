use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::driver::{ExportRun, ExportSummary, scratch_dir};
use crate::error::ExportResult;
use crate::loader::WarehouseLoader;
use crate::schema::SchemaRegistry;
use crate::types::RecordType;
use crate::store::{ObjectStore, delete_prefix};
use crate::transform::{CsvRowWriter, reshape_csv};
use crate::vendor::urls::{ExportFile, parse_export_file_url};
use crate::vendor::{ExportApi, wait_for_export};
use crate::warehouse::Warehouse;

/// Settings of a historical-mode run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalOptions {
    /// Fixed delay between two export status checks.
    pub poll_interval: Duration,
    pub scratch_parent: Option<PathBuf>,
}

/// Exporter requesting a date's data from the vendor's export API.
///
/// The vendor produces one CSV file per record type and file index. Each file is reshaped to
/// the registry's column order, staged, and the date is loaded. Staged output of earlier runs
/// for the date is removed first, since the vendor export always covers the whole date. A
/// record type the export has no file for gets a header-only staged file.
#[derive(Debug)]
pub struct HistoricalExporter<A, Stg, W> {
    api: A,
    staging: Stg,
    loader: WarehouseLoader<W>,
    registry: Arc<SchemaRegistry>,
    run: ExportRun,
    options: HistoricalOptions,
}

impl<A, Stg, W> HistoricalExporter<A, Stg, W>
where
    A: ExportApi,
    Stg: ObjectStore,
    W: Warehouse,
{
    pub fn new(
        api: A,
        staging: Stg,
        loader: WarehouseLoader<W>,
        registry: Arc<SchemaRegistry>,
        run: ExportRun,
        options: HistoricalOptions,
    ) -> Self {
        Self {
            api,
            staging,
            loader,
            registry,
            run,
            options,
        }
    }

    pub async fn run(&self) -> ExportResult<ExportSummary> {
        let layout = self.run.layout();
        info!(
            date = %self.run.date,
            staging_bucket = %self.run.staging_bucket,
            prefix = %self.run.prefix,
            version = self.run.version,
            "starting historical export"
        );

        let job_id = self.api.start_export(&self.run.date).await?;
        let urls = wait_for_export(&self.api, &job_id, self.options.poll_interval).await?;
        let files = urls
            .iter()
            .map(|url| parse_export_file_url(url))
            .collect::<ExportResult<Vec<ExportFile>>>()?;

        let deleted = delete_prefix(
            &self.staging,
            &self.run.staging_bucket,
            &layout.date_root(),
            None,
        )
        .await?;
        info!(deleted, "removed staged output of earlier runs");

        let mut summary = ExportSummary {
            files_seen: files.len(),
            ..ExportSummary::default()
        };

        let scratch = scratch_dir(self.options.scratch_parent.as_deref())?;
        for file in &files {
            let rows = self.stage_file(file, scratch.path()).await?;
            summary.add_rows([(file.record_type, rows)]);
            summary.files_transformed += 1;
        }

        for record_type in RecordType::ALL {
            if !files.iter().any(|file| file.record_type == record_type) {
                self.stage_header_only(record_type).await?;
            }
        }

        summary.loaded = self.loader.load(&layout).await?;

        info!(
            files_seen = summary.files_seen,
            files_transformed = summary.files_transformed,
            "historical export finished"
        );

        Ok(summary)
    }

    /// Downloads, reshapes and stages one export file. Returns the number of rows staged.
    async fn stage_file(&self, file: &ExportFile, scratch: &Path) -> ExportResult<usize> {
        let downloaded = scratch.join(format!("download-{}-{}", file.record_type, file.index));
        self.api.download(&file.url, &downloaded).await?;

        let staged_name = file.staged_name();
        let reshaped = scratch.join(&staged_name);
        let registry = Arc::clone(&self.registry);
        let record_type = file.record_type;
        let reshaped_path = reshaped.clone();

        let rows = tokio::task::spawn_blocking(move || {
            reshape_csv(&downloaded, &reshaped_path, record_type, &registry)
        })
        .await??;

        let key = self.run.layout().staged_key(record_type, &staged_name);
        info!(bucket = %self.run.staging_bucket, %key, rows, "staging export file");
        self.staging
            .upload(&self.run.staging_bucket, &key, &reshaped)
            .await?;

        Ok(rows)
    }

    /// Stages a file holding only the header of a record type the export produced nothing for.
    async fn stage_header_only(&self, record_type: RecordType) -> ExportResult<()> {
        let schema = self.registry.schema(record_type).clone();
        let header = CsvRowWriter::new(Vec::new(), schema)?.into_inner()?;

        let key = self
            .run
            .layout()
            .staged_key(record_type, &format!("{record_type}-empty.csv"));
        warn!(
            %record_type,
            bucket = %self.run.staging_bucket,
            %key,
            "export has no file for record type, staging header only"
        );

        self.staging
            .put(&self.run.staging_bucket, &key, Bytes::from(header))
            .await
    }
}
