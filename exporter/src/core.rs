use ::config::shared::ExporterConfig;
use export::driver::{
    ExportRun, ExportSummary, Exporter, HistoricalExporter, HistoricalOptions, MessagesExporter,
    MessagesSummary, StreamExporter, StreamOptions,
};
use export::loader::{LoadTarget, WarehouseLoader};
use export::schema::SchemaRegistry;
use export::store::StoreRole;
use export::store::s3::S3ObjectStore;
use export::vendor::client::VendorApiClient;
use export::warehouse::bigquery::BigQueryWarehouse;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cli::{Command, RunArgs, StreamArgs};
use crate::error::{ExporterError, ExporterResult};

/// Exporter built from production clients.
type ProductionExporter =
    Exporter<S3ObjectStore, S3ObjectStore, BigQueryWarehouse, VendorApiClient>;

/// Builds the clients for `command` and runs it.
pub async fn run_export(config: ExporterConfig, command: Command) -> ExporterResult<()> {
    info!(mode = command.name(), "starting export");

    log_config(&config);

    match &command {
        Command::Stream(stream_args) => {
            let exporter = build_exporter(&config, &stream_args.run, Some(stream_args)).await?;
            log_summary(&exporter.run().await?);
        }
        Command::Historical(args) => {
            let exporter = build_exporter(&config, args, None).await?;
            log_summary(&exporter.run().await?);
        }
        Command::Messages(args) => {
            let exporter = MessagesExporter::new(
                vendor_client(&config)?,
                staging_store(&config).await,
                build_loader(&config, args).await?,
                export_run(args),
            );
            log_messages_summary(&exporter.run().await?);
        }
    }

    Ok(())
}

/// Builds the session exporter, streaming when `stream_args` are given.
async fn build_exporter(
    config: &ExporterConfig,
    args: &RunArgs,
    stream_args: Option<&StreamArgs>,
) -> ExporterResult<ProductionExporter> {
    let registry = build_registry(config)?;
    let loader = WarehouseLoader::new(
        build_warehouse(config).await?,
        registry.clone(),
        load_target(config, args),
    );
    let staging = staging_store(config).await;
    let run = export_run(args);

    let exporter = match stream_args {
        Some(stream_args) => {
            let source = S3ObjectStore::new(&config.source, StoreRole::Source).await;
            let options = StreamOptions {
                source_bucket: stream_args.s3_bucket.clone(),
                clean: stream_args.clean,
                max_concurrent_files: config.transform.max_concurrent_files,
                scratch_parent: config.transform.scratch_dir.clone(),
                page_size: None,
            };

            Exporter::Stream(StreamExporter::new(
                source, staging, loader, registry, run, options,
            ))
        }
        None => {
            let vendor = config.require_vendor().map_err(ExporterError::config)?;
            let options = HistoricalOptions {
                poll_interval: Duration::from_millis(vendor.poll_interval_ms),
                scratch_parent: config.transform.scratch_dir.clone(),
            };

            Exporter::Historical(HistoricalExporter::new(
                vendor_client(config)?,
                staging,
                loader,
                registry,
                run,
                options,
            ))
        }
    };

    Ok(exporter)
}

fn build_registry(config: &ExporterConfig) -> ExporterResult<Arc<SchemaRegistry>> {
    let registry = match &config.transform.schema_dir {
        Some(dir) => SchemaRegistry::from_dir(dir)?,
        None => SchemaRegistry::bundled()?,
    };

    Ok(Arc::new(registry))
}

async fn build_warehouse(config: &ExporterConfig) -> ExporterResult<BigQueryWarehouse> {
    let project_id = config.gcp.project_id.clone();
    let warehouse = match &config.gcp.service_account_key {
        Some(key) => BigQueryWarehouse::new_with_key(project_id, key.expose_secret()).await?,
        None => BigQueryWarehouse::new_with_adc(project_id).await?,
    };

    Ok(warehouse)
}

async fn build_loader(
    config: &ExporterConfig,
    args: &RunArgs,
) -> ExporterResult<WarehouseLoader<BigQueryWarehouse>> {
    Ok(WarehouseLoader::new(
        build_warehouse(config).await?,
        build_registry(config)?,
        load_target(config, args),
    ))
}

async fn staging_store(config: &ExporterConfig) -> S3ObjectStore {
    S3ObjectStore::new(&config.staging.store, StoreRole::Staging).await
}

fn vendor_client(config: &ExporterConfig) -> ExporterResult<VendorApiClient> {
    let vendor = config.require_vendor().map_err(ExporterError::config)?;

    Ok(VendorApiClient::new(vendor.clone())?)
}

fn export_run(args: &RunArgs) -> ExportRun {
    ExportRun {
        date: args.date,
        staging_bucket: args.bucket.clone(),
        prefix: args.prefix.clone(),
        version: args.version,
    }
}

fn load_target(config: &ExporterConfig, args: &RunArgs) -> LoadTarget {
    LoadTarget {
        staging_bucket: args.bucket.clone(),
        uri_scheme: config.staging.uri_scheme.clone(),
        dataset: args.bq_dataset.clone(),
        table_prefix: args.table_prefix.clone(),
        external_dataset: config.warehouse.external_dataset.clone(),
        max_bad_records: config.warehouse.max_bad_records,
    }
}

fn log_config(config: &ExporterConfig) {
    debug!(
        project_id = %config.gcp.project_id,
        uses_service_account_key = config.gcp.service_account_key.is_some(),
        "using gcp config"
    );
    debug!(
        source_region = %config.source.region,
        staging_region = %config.staging.store.region,
        staging_endpoint = ?config.staging.store.endpoint_url,
        uri_scheme = %config.staging.uri_scheme,
        "using object store config"
    );
    debug!(
        external_dataset = %config.warehouse.external_dataset,
        max_bad_records = config.warehouse.max_bad_records,
        max_concurrent_files = config.transform.max_concurrent_files,
        schema_dir = ?config.transform.schema_dir,
        "using warehouse and transform config"
    );
    if let Some(vendor) = &config.vendor {
        debug!(
            api_url = %vendor.api_url,
            app_id = %vendor.app_id,
            api_version = %vendor.api_version,
            poll_interval_ms = vendor.poll_interval_ms,
            "using vendor api config"
        );
    }
}

fn log_summary(summary: &ExportSummary) {
    for (record_type, rows) in &summary.rows {
        info!(%record_type, rows, "staged rows");
    }
    for table in &summary.loaded {
        info!(
            record_type = %table.record_type,
            destination = %table.destination,
            created = table.created,
            "loaded table"
        );
    }
    info!(
        files_seen = summary.files_seen,
        files_skipped = summary.files_skipped,
        files_transformed = summary.files_transformed,
        tables = summary.loaded.len(),
        "export finished"
    );
}

fn log_messages_summary(summary: &MessagesSummary) {
    match &summary.destination {
        Some(destination) => info!(
            messages = summary.messages,
            %destination,
            "messages export finished"
        ),
        None => info!("messages export finished without messages to load"),
    }
}
