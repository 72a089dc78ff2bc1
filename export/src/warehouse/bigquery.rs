use gcp_bigquery_client::Client;
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::job_configuration::JobConfiguration;
use gcp_bigquery_client::model::job_configuration_load::JobConfigurationLoad;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::table_reference::TableReference;
use gcp_bigquery_client::model::time_partitioning::TimePartitioning;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, ExportError, ExportResult};
use crate::export_error;
use crate::schema::TableSchema;
use crate::types::LogicalDate;
use crate::warehouse::{
    ExternalTableOptions, JsonPartitionLoad, PARTITION_COLUMN, Statement, TableRef, Warehouse,
};

/// Interval between two status checks of a job that outlived the query call.
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// State BigQuery reports for finished jobs.
const JOB_STATE_DONE: &str = "DONE";

/// Converts BigQuery errors to export errors with appropriate classification.
fn bq_error_to_export_error(err: BQError) -> ExportError {
    let (kind, description) = match &err {
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account authenticator",
        ),
        BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery application default credentials",
        ),
        BQError::InvalidAuthorizedUserAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery authorized user authenticator",
        ),
        BQError::AuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery OAuth authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),
        BQError::RequestError(_) => (
            ErrorKind::WarehouseQueryFailed,
            "BigQuery request failed",
        ),
        BQError::ResponseError { .. } => (
            ErrorKind::WarehouseQueryFailed,
            "BigQuery response error",
        ),
        _ => (ErrorKind::WarehouseQueryFailed, "BigQuery operation failed"),
    };

    export_error!(kind, description, err.to_string())
}

/// Sanitizes a BigQuery identifier for safe backtick quoting.
///
/// Rejects empty identifiers and identifiers containing control characters. Backticks and
/// backslashes are escaped so the value can be wrapped in backticks without altering it.
pub fn sanitize_identifier(identifier: &str, context: &str) -> ExportResult<String> {
    if identifier.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "Invalid BigQuery identifier",
            format!("{context} cannot be empty")
        );
    }

    if identifier.chars().any(char::is_control) {
        bail!(
            ErrorKind::ConfigError,
            "Invalid BigQuery identifier",
            format!("{context} contains control characters")
        );
    }

    let mut escaped = String::with_capacity(identifier.len());
    for ch in identifier.chars() {
        match ch {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }

    Ok(escaped)
}

/// Quotes a value as a GoogleSQL string literal.
fn string_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('\'');

    quoted
}

/// Returns the fully qualified, quoted name `` `project.dataset.table` ``.
pub fn full_table_name(project_id: &str, table: &TableRef) -> ExportResult<String> {
    let project_id = sanitize_identifier(project_id, "BigQuery project id")?;
    let dataset_id = sanitize_identifier(&table.dataset, "BigQuery dataset id")?;
    let table_id = sanitize_identifier(&table.table, "BigQuery table id")?;

    Ok(format!("`{project_id}.{dataset_id}.{table_id}`"))
}

/// Returns the partition value expression of a date.
fn partition_value(date: &LogicalDate) -> String {
    format!("PARSE_DATE('%Y%m%d', '{date}')")
}

/// Renders the select feeding a destination table from an external table.
fn render_select(
    project_id: &str,
    source: &TableRef,
    except: &[String],
    date: &LogicalDate,
) -> ExportResult<String> {
    let source = full_table_name(project_id, source)?;
    let except_clause = if except.is_empty() {
        String::new()
    } else {
        let columns = except
            .iter()
            .map(|column| Ok(format!("`{}`", sanitize_identifier(column, "BigQuery column name")?)))
            .collect::<ExportResult<Vec<_>>>()?;
        format!(" except ({})", columns.join(", "))
    };

    Ok(format!(
        "select *{except_clause}, {} as {PARTITION_COLUMN} from {source}",
        partition_value(date)
    ))
}

/// Renders a statement as GoogleSQL.
pub fn render_statement(project_id: &str, statement: &Statement) -> ExportResult<String> {
    match statement {
        Statement::DeletePartition { table, date } => {
            let table = full_table_name(project_id, table)?;
            Ok(format!(
                "delete from {table} where {PARTITION_COLUMN} = {}",
                partition_value(date)
            ))
        }
        Statement::CreatePartitionedTableAs {
            table,
            source,
            except,
            date,
        } => {
            let table = full_table_name(project_id, table)?;
            let select = render_select(project_id, source, except, date)?;
            Ok(format!(
                "create table {table} partition by {PARTITION_COLUMN} as {select}"
            ))
        }
        Statement::InsertSelect {
            table,
            source,
            except,
            date,
        } => {
            let table = full_table_name(project_id, table)?;
            let select = render_select(project_id, source, except, date)?;
            Ok(format!("insert into {table} {select}"))
        }
    }
}

/// Renders the DDL creating an external CSV table.
pub fn render_external_table(
    project_id: &str,
    table: &TableRef,
    schema: &TableSchema,
    options: &ExternalTableOptions,
) -> ExportResult<String> {
    let table = full_table_name(project_id, table)?;
    let columns = schema
        .columns
        .iter()
        .map(|column| {
            let name = sanitize_identifier(&column.name, "BigQuery column name")?;
            let not_null = if column.is_required() { " not null" } else { "" };
            Ok(format!("`{name}` {}{not_null}", column.ddl_type()))
        })
        .collect::<ExportResult<Vec<_>>>()?;

    Ok(format!(
        "create external table {table} ({}) options (format = 'CSV', uris = [{}], \
         skip_leading_rows = {}, allow_quoted_newlines = {}, max_bad_records = {})",
        columns.join(", "),
        string_literal(&options.uri),
        options.skip_leading_rows,
        options.allow_quoted_newlines,
        options.max_bad_records,
    ))
}

/// Builds the load job configuration of a JSON partition load.
pub fn json_partition_load_config(
    project_id: &str,
    load: &JsonPartitionLoad,
) -> ExportResult<JobConfigurationLoad> {
    sanitize_identifier(project_id, "BigQuery project id")?;
    sanitize_identifier(&load.table.dataset, "BigQuery dataset id")?;
    sanitize_identifier(&load.table.table, "BigQuery table id")?;

    let mut time_partitioning = TimePartitioning::per_day().field(PARTITION_COLUMN);
    time_partitioning.require_partition_filter = Some(true);

    Ok(JobConfigurationLoad {
        source_uris: Some(vec![load.uri.clone()]),
        source_format: Some("NEWLINE_DELIMITED_JSON".to_string()),
        autodetect: Some(true),
        destination_table: Some(TableReference::new(
            project_id,
            &load.table.dataset,
            &load.partition_table_id(),
        )),
        create_disposition: Some("CREATE_IF_NEEDED".to_string()),
        write_disposition: Some("WRITE_TRUNCATE".to_string()),
        schema_update_options: Some(vec!["ALLOW_FIELD_ADDITION".to_string()]),
        time_partitioning: Some(time_partitioning),
        ..JobConfigurationLoad::default()
    })
}

/// Warehouse backed by BigQuery.
///
/// Statements run through the jobs API. A job still running when the query call returns is
/// polled until it is done.
#[derive(Clone)]
pub struct BigQueryWarehouse {
    project_id: String,
    client: Client,
}

impl BigQueryWarehouse {
    /// Creates a warehouse authenticating with a service account key JSON string.
    pub async fn new_with_key(project_id: String, sa_key: &str) -> ExportResult<Self> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_export_error)?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_export_error)?;

        Ok(Self { project_id, client })
    }

    /// Creates a warehouse using Application Default Credentials.
    pub async fn new_with_adc(project_id: String) -> ExportResult<Self> {
        let client = ClientBuilder::new()
            .build_from_application_default_credentials()
            .await
            .map_err(bq_error_to_export_error)?;

        Ok(Self { project_id, client })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Runs a query and waits for its job to finish.
    async fn query(&self, sql: String) -> ExportResult<()> {
        info!(%sql, "running bigquery statement");

        let response = self
            .client
            .job()
            .query(&self.project_id, QueryRequest::new(sql))
            .await
            .map_err(bq_error_to_export_error)?;

        if response.job_complete.unwrap_or(true) {
            return Ok(());
        }

        let Some(job_reference) = response.job_reference else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "BigQuery job is incomplete and has no reference"
            );
        };
        let Some(job_id) = job_reference.job_id else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "BigQuery job is incomplete and has no id"
            );
        };

        self.wait_for_job(&job_id, job_reference.location.as_deref())
            .await
    }

    async fn wait_for_job(&self, job_id: &str, location: Option<&str>) -> ExportResult<()> {
        loop {
            let job = self
                .client
                .job()
                .get_job(&self.project_id, job_id, location)
                .await
                .map_err(bq_error_to_export_error)?;

            let Some(status) = job.status else {
                debug!(job_id, "bigquery job has no status yet");
                sleep(JOB_POLL_INTERVAL).await;
                continue;
            };

            if status.state.as_deref() != Some(JOB_STATE_DONE) {
                debug!(job_id, state = ?status.state, "waiting for bigquery job");
                sleep(JOB_POLL_INTERVAL).await;
                continue;
            }

            return match status.error_result {
                Some(error) => bail!(
                    ErrorKind::WarehouseQueryFailed,
                    "BigQuery job failed",
                    format!(
                        "job {job_id}: {}",
                        error.message.unwrap_or_else(|| "no message".to_string())
                    )
                ),
                None => Ok(()),
            };
        }
    }
}

impl Warehouse for BigQueryWarehouse {
    async fn table_exists(&self, table: &TableRef) -> ExportResult<bool> {
        let result = self
            .client
            .table()
            .get(&self.project_id, &table.dataset, &table.table, None)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(BQError::ResponseError { error }) if error.error.code == 404 => Ok(false),
            Err(err) => Err(bq_error_to_export_error(err)),
        }
    }

    async fn drop_table(&self, table: &TableRef) -> ExportResult<()> {
        let full_table_name = full_table_name(&self.project_id, table)?;
        info!(%full_table_name, "dropping table from bigquery");

        self.query(format!("drop table if exists {full_table_name}"))
            .await
    }

    async fn create_external_table(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        options: &ExternalTableOptions,
    ) -> ExportResult<()> {
        info!(%table, uri = %options.uri, "creating external table in bigquery");

        let sql = render_external_table(&self.project_id, table, schema, options)?;
        self.query(sql).await
    }

    async fn execute(&self, statement: &Statement) -> ExportResult<()> {
        let sql = render_statement(&self.project_id, statement)?;
        self.query(sql).await
    }

    async fn load_json_partition(&self, load: &JsonPartitionLoad) -> ExportResult<()> {
        info!(
            table = %load.table,
            date = %load.date,
            uri = %load.uri,
            "running bigquery json load"
        );

        let job = Job {
            configuration: Some(JobConfiguration {
                load: Some(json_partition_load_config(&self.project_id, load)?),
                ..JobConfiguration::default()
            }),
            ..Job::default()
        };
        let job = self
            .client
            .job()
            .insert(&self.project_id, job)
            .await
            .map_err(bq_error_to_export_error)?;

        let Some(job_reference) = job.job_reference else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "BigQuery load job has no reference",
                load.table
            );
        };
        let Some(job_id) = job_reference.job_id else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "BigQuery load job has no id",
                load.table
            );
        };

        self.wait_for_job(&job_id, job_reference.location.as_deref())
            .await
    }
}

impl fmt::Debug for BigQueryWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryWarehouse")
            .field("project_id", &self.project_id)
            .finish()
    }
}
