use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::driver::{ExportRun, ExportSummary, scratch_dir};
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::export_error;
use crate::files::list_data_files;
use crate::ledger::ImportLedger;
use crate::loader::WarehouseLoader;
use crate::schema::SchemaRegistry;
use crate::store::ObjectStore;
use crate::store::paths::{StagingLayout, base_name};
use crate::transform::{TransformOutput, transform_file};
use crate::warehouse::Warehouse;

/// Settings of a stream-mode run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Bucket the vendor streams session files to.
    pub source_bucket: String,
    /// Discards staged output and the import ledger of the date before processing.
    pub clean: bool,
    /// Largest number of files transformed at the same time.
    pub max_concurrent_files: usize,
    pub scratch_parent: Option<PathBuf>,
    /// Listing page size override.
    pub page_size: Option<i32>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            source_bucket: String::new(),
            clean: false,
            max_concurrent_files: 1,
            scratch_parent: None,
            page_size: None,
        }
    }
}

/// Exporter transforming the session files streamed into the source bucket.
///
/// Files listed in the import ledger are skipped, so an interrupted run resumes where it
/// stopped. The warehouse load runs once all files are staged.
#[derive(Debug)]
pub struct StreamExporter<Src, Stg, W> {
    source: Src,
    staging: Stg,
    loader: WarehouseLoader<W>,
    registry: Arc<SchemaRegistry>,
    run: ExportRun,
    options: StreamOptions,
}

impl<Src, Stg, W> StreamExporter<Src, Stg, W>
where
    Src: ObjectStore + Clone + Send + Sync + 'static,
    Stg: ObjectStore + Clone + Send + Sync + 'static,
    W: Warehouse,
{
    pub fn new(
        source: Src,
        staging: Stg,
        loader: WarehouseLoader<W>,
        registry: Arc<SchemaRegistry>,
        run: ExportRun,
        options: StreamOptions,
    ) -> Self {
        Self {
            source,
            staging,
            loader,
            registry,
            run,
            options,
        }
    }

    pub async fn run(&self) -> ExportResult<ExportSummary> {
        let layout = self.run.layout();
        let ledger = ImportLedger::new(
            self.staging.clone(),
            self.run.staging_bucket.clone(),
            layout.clone(),
        )
        .with_page_size(self.options.page_size);

        info!(
            date = %self.run.date,
            source_bucket = %self.options.source_bucket,
            staging_bucket = %self.run.staging_bucket,
            prefix = %self.run.prefix,
            version = self.run.version,
            clean = self.options.clean,
            "starting stream export"
        );

        let imported = if self.options.clean {
            let deleted = ledger.clear().await?;
            info!(deleted, "cleaned staged output of the date");
            Default::default()
        } else {
            ledger.already_imported().await?
        };

        let data_files = list_data_files(
            &self.source,
            &self.run.date,
            &self.options.source_bucket,
            &self.run.prefix,
            self.options.page_size,
        )
        .await?;

        let mut summary = ExportSummary {
            files_seen: data_files.len(),
            ..ExportSummary::default()
        };

        let mut pending = Vec::with_capacity(data_files.len());
        for key in data_files {
            if imported.contains(base_name(&key)) {
                info!(%key, "skipping already imported file");
                summary.files_skipped += 1;
            } else {
                pending.push(key);
            }
        }

        let outputs = self.process_files(pending, &ledger).await?;
        summary.files_transformed = outputs.len();
        for output in outputs {
            summary.add_rows(output.rows);
        }

        summary.loaded = self.loader.load(&layout).await?;

        info!(
            files_seen = summary.files_seen,
            files_skipped = summary.files_skipped,
            files_transformed = summary.files_transformed,
            "stream export finished"
        );

        Ok(summary)
    }

    /// Transforms and stages files with bounded concurrency.
    ///
    /// Every file is attempted. Failures are returned together once all workers are done.
    async fn process_files(
        &self,
        keys: Vec<String>,
        ledger: &ImportLedger<Stg>,
    ) -> ExportResult<Vec<TransformOutput>> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_files.max(1)));
        let mut join_set = JoinSet::new();

        for key in keys {
            let permit = semaphore.clone().acquire_owned().await.map_err(|err| {
                export_error!(
                    ErrorKind::TransformWorkerPanic,
                    "Could not acquire a transform slot",
                    err.to_string()
                )
            })?;

            let worker = FileWorker {
                source: self.source.clone(),
                source_bucket: self.options.source_bucket.clone(),
                staging: self.staging.clone(),
                staging_bucket: self.run.staging_bucket.clone(),
                ledger: ledger.clone(),
                registry: Arc::clone(&self.registry),
                scratch_parent: self.options.scratch_parent.clone(),
            };

            join_set.spawn(async move {
                let result = worker.process(&key).await;
                drop(permit);

                (key, result)
            });
        }

        let mut outputs = Vec::new();
        let mut errors: Vec<ExportError> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(output))) => outputs.push(output),
                Ok((key, Err(err))) => {
                    error!(%key, error = %err, "failed to process source file");
                    errors.push(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "source file worker panicked");
                    errors.push(join_err.into());
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(outputs)
    }
}

/// Everything a worker needs to take one source file through transform and staging.
struct FileWorker<Src, Stg> {
    source: Src,
    source_bucket: String,
    staging: Stg,
    staging_bucket: String,
    ledger: ImportLedger<Stg>,
    registry: Arc<SchemaRegistry>,
    scratch_parent: Option<PathBuf>,
}

impl<Src, Stg> FileWorker<Src, Stg>
where
    Src: ObjectStore,
    Stg: ObjectStore,
{
    /// Transforms a file, stages its CSVs, then marks it imported.
    async fn process(&self, key: &str) -> ExportResult<TransformOutput> {
        let scratch = scratch_dir(self.scratch_parent.as_deref())?;

        let output = transform_file(
            &self.source,
            &self.source_bucket,
            key,
            Arc::clone(&self.registry),
            scratch.path(),
        )
        .await?;

        stage_files(
            &self.staging,
            &self.staging_bucket,
            self.ledger.layout(),
            &output,
        )
        .await?;

        self.ledger.mark_imported(base_name(key)).await?;

        Ok(output)
    }
}

/// Uploads the CSV files of a transform output under their record type directories.
async fn stage_files<S>(
    store: &S,
    bucket: &str,
    layout: &StagingLayout,
    output: &TransformOutput,
) -> ExportResult<()>
where
    S: ObjectStore,
{
    for (record_type, path) in &output.files {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                export_error!(
                    ErrorKind::IoError,
                    "Transformed file has no usable name",
                    path.display()
                )
            })?;

        let key = layout.staged_key(*record_type, file_name);
        info!(bucket, %key, "staging transformed file");
        store.upload(bucket, &key, path).await?;
    }

    Ok(())
}
