use std::fmt;
use std::future::Future;

use crate::error::ExportResult;
use crate::schema::TableSchema;
use crate::types::LogicalDate;

/// Name of the date column destination tables are partitioned by.
pub const PARTITION_COLUMN: &str = "load_date";

/// A table within a dataset of the warehouse project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Options of an external table reading staged CSV files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTableOptions {
    /// Wildcard URI of the staged files, e.g. `gs://bucket/prefix/v1/20200601/events/*`.
    pub uri: String,
    /// Number of unparseable rows tolerated before a read fails.
    pub max_bad_records: i64,
    pub skip_leading_rows: i64,
    pub allow_quoted_newlines: bool,
}

impl ExternalTableOptions {
    /// Options for staged CSV files carrying a header line.
    pub fn staged_csv(uri: impl Into<String>, max_bad_records: i64) -> Self {
        Self {
            uri: uri.into(),
            max_bad_records,
            skip_leading_rows: 1,
            allow_quoted_newlines: true,
        }
    }
}

/// Data statements the loader runs against the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Deletes the rows of one date partition.
    DeletePartition { table: TableRef, date: LogicalDate },
    /// Creates a table partitioned by [`PARTITION_COLUMN`] from the rows of `source`.
    CreatePartitionedTableAs {
        table: TableRef,
        source: TableRef,
        except: Vec<String>,
        date: LogicalDate,
    },
    /// Appends the rows of `source` to an existing table.
    InsertSelect {
        table: TableRef,
        source: TableRef,
        except: Vec<String>,
        date: LogicalDate,
    },
}

impl Statement {
    /// Returns the table the statement writes to.
    pub fn target(&self) -> &TableRef {
        match self {
            Statement::DeletePartition { table, .. }
            | Statement::CreatePartitionedTableAs { table, .. }
            | Statement::InsertSelect { table, .. } => table,
        }
    }
}

/// A load job replacing one date partition of a table with newline-delimited JSON objects.
///
/// The table is created when missing, partitioned by [`PARTITION_COLUMN`] with a partition
/// filter required. Columns are detected from the objects and columns not in the table yet are
/// added to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPartitionLoad {
    pub table: TableRef,
    pub date: LogicalDate,
    /// URI of the staged file, e.g. `gs://bucket/prefix/v1/20200601/messages/messages.json`.
    pub uri: String,
}

impl JsonPartitionLoad {
    /// Returns the table name with the partition decorator, `<table>$<YYYYMMDD>`.
    pub fn partition_table_id(&self) -> String {
        format!("{}${}", self.table.table, self.date)
    }
}

/// Warehouse operations needed to load staged files.
///
/// Implemented for BigQuery and for memory.
pub trait Warehouse {
    /// Returns whether the table exists.
    fn table_exists(&self, table: &TableRef) -> impl Future<Output = ExportResult<bool>> + Send;

    /// Drops the table if it exists.
    fn drop_table(&self, table: &TableRef) -> impl Future<Output = ExportResult<()>> + Send;

    /// Creates an external CSV table with the given columns over staged files.
    fn create_external_table(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        options: &ExternalTableOptions,
    ) -> impl Future<Output = ExportResult<()>> + Send;

    /// Runs a statement and waits for it to complete.
    fn execute(&self, statement: &Statement) -> impl Future<Output = ExportResult<()>> + Send;

    /// Runs a JSON load job and waits for it to complete.
    fn load_json_partition(
        &self,
        load: &JsonPartitionLoad,
    ) -> impl Future<Output = ExportResult<()>> + Send;
}
