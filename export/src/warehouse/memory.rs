use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::schema::{ColumnType, TableSchema};
use crate::store::memory::MemoryObjectStore;
use crate::types::LogicalDate;
use crate::warehouse::bigquery::{render_external_table, render_statement};
use crate::warehouse::{
    ExternalTableOptions, JsonPartitionLoad, PARTITION_COLUMN, Statement, TableRef, Warehouse,
};

/// Project name used when rendering logged statements.
const MEMORY_PROJECT: &str = "memory";

#[derive(Debug, Clone)]
struct ExternalTable {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    uri: String,
    max_bad_records: i64,
}

#[derive(Debug, Clone, Default)]
struct NativeTable {
    columns: Vec<String>,
    partitions: BTreeMap<LogicalDate, Vec<Vec<String>>>,
}

#[derive(Debug, Default)]
struct Inner {
    external_tables: HashMap<TableRef, ExternalTable>,
    tables: HashMap<TableRef, NativeTable>,
    statements: Vec<String>,
}

/// Warehouse simulating partitioned tables in memory.
///
/// External tables read CSV objects of a [`MemoryObjectStore`] at query time, matching the
/// `<scheme>://<bucket>/<key prefix>*` form of their URI. Every statement is recorded in its
/// rendered SQL form. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryWarehouse {
    store: MemoryObjectStore,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new(store: MemoryObjectStore) -> Self {
        Self {
            store,
            inner: Arc::default(),
        }
    }

    /// Returns the rows of one partition of a table.
    pub async fn partition_rows(&self, table: &TableRef, date: &LogicalDate) -> Vec<Vec<String>> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .and_then(|table| table.partitions.get(date))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the columns of a table, without the partition column.
    pub async fn table_columns(&self, table: &TableRef) -> Option<Vec<String>> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(|table| table.columns.clone())
    }

    /// Returns the external tables that currently exist.
    pub async fn external_tables(&self) -> Vec<TableRef> {
        let inner = self.inner.lock().await;
        let mut tables: Vec<TableRef> = inner.external_tables.keys().cloned().collect();
        tables.sort();
        tables
    }

    /// Returns every statement run so far, rendered as SQL.
    pub async fn statements(&self) -> Vec<String> {
        self.inner.lock().await.statements.clone()
    }

    /// Reads the rows an external table currently exposes.
    ///
    /// Rows with a field that does not parse as its column type are skipped, and the read fails
    /// once more than `max_bad_records` of them were seen.
    async fn read_external(&self, table: &ExternalTable) -> ExportResult<Vec<Vec<String>>> {
        let Some((bucket, key_prefix)) = split_uri(&table.uri) else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "External table uri is not supported",
                table.uri.clone()
            );
        };

        let mut rows = Vec::new();
        let mut bad_records = 0i64;
        for (key, body) in self.store.objects_under(bucket, key_prefix).await {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_reader(body.as_ref());

            for record in reader.records() {
                let record = record?;
                let mut row: Vec<String> = record.iter().map(str::to_string).collect();
                row.resize(table.columns.len(), String::new());

                if row_parses(&row, &table.types) {
                    rows.push(row);
                    continue;
                }

                bad_records += 1;
                if bad_records > table.max_bad_records {
                    bail!(
                        ErrorKind::WarehouseQueryFailed,
                        "Too many bad records in external table files",
                        format!("{bad_records} bad records, last one in {key}")
                    );
                }
            }
        }

        Ok(rows)
    }

    async fn select(
        &self,
        source: &TableRef,
        except: &[String],
    ) -> ExportResult<(Vec<String>, Vec<Vec<String>>)> {
        let external = {
            let inner = self.inner.lock().await;
            match inner.external_tables.get(source) {
                Some(external) => external.clone(),
                None => bail!(
                    ErrorKind::WarehouseQueryFailed,
                    "Source table does not exist",
                    source
                ),
            }
        };

        let rows = self.read_external(&external).await?;
        let kept: Vec<usize> = external
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !except.contains(column))
            .map(|(index, _)| index)
            .collect();

        let columns = kept.iter().map(|&index| external.columns[index].clone()).collect();
        let rows = rows
            .into_iter()
            .map(|row| kept.iter().map(|&index| row[index].clone()).collect())
            .collect();

        Ok((columns, rows))
    }

    /// Reads the objects of a staged JSON file, checking they all belong to the loaded partition.
    async fn read_json_rows(
        &self,
        load: &JsonPartitionLoad,
    ) -> ExportResult<Vec<Map<String, Value>>> {
        let Some((bucket, key)) = split_object_uri(&load.uri) else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "Load source uri is not supported",
                load.uri.clone()
            );
        };
        let Some(body) = self.store.get(bucket, key).await else {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "Load source object does not exist",
                load.uri.clone()
            );
        };

        let partition = load.date.as_naive_date().to_string();
        let mut objects = Vec::new();
        let stream =
            serde_json::Deserializer::from_slice(&body).into_iter::<Map<String, Value>>();
        for object in stream {
            let object = object?;
            if object.get(PARTITION_COLUMN).and_then(Value::as_str) != Some(partition.as_str()) {
                bail!(
                    ErrorKind::WarehouseQueryFailed,
                    "Loaded row is outside the target partition",
                    load.partition_table_id()
                );
            }
            objects.push(object);
        }

        Ok(objects)
    }
}

/// Returns whether every non-empty field parses as its column type.
fn row_parses(row: &[String], types: &[ColumnType]) -> bool {
    row.iter().zip(types).all(|(field, typ)| {
        field.is_empty()
            || match typ {
                ColumnType::Integer => field.parse::<i64>().is_ok(),
                ColumnType::Float | ColumnType::Numeric => field.parse::<f64>().is_ok(),
                ColumnType::Boolean => {
                    field.eq_ignore_ascii_case("true") || field.eq_ignore_ascii_case("false")
                }
                ColumnType::String | ColumnType::Timestamp | ColumnType::Date => true,
            }
    })
}

/// Splits `<scheme>://<bucket>/<key>` into bucket and key.
fn split_object_uri(uri: &str) -> Option<(&str, &str)> {
    let (_, location) = uri.split_once("://")?;
    location.split_once('/')
}

/// Splits `<scheme>://<bucket>/<key prefix>*` into bucket and key prefix.
fn split_uri(uri: &str) -> Option<(&str, &str)> {
    let (bucket, key_pattern) = split_object_uri(uri)?;
    let key_prefix = key_pattern.strip_suffix('*')?;

    Some((bucket, key_prefix))
}

/// Renders a JSON field the way it is stored in a native table.
fn json_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        value => value.to_string(),
    }
}

impl Warehouse for MemoryWarehouse {
    async fn table_exists(&self, table: &TableRef) -> ExportResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.contains_key(table) || inner.external_tables.contains_key(table))
    }

    async fn drop_table(&self, table: &TableRef) -> ExportResult<()> {
        info!(%table, "dropping table from memory warehouse");

        let mut inner = self.inner.lock().await;
        inner.statements.push(format!("drop table if exists {table}"));
        inner.external_tables.remove(table);
        inner.tables.remove(table);

        Ok(())
    }

    async fn create_external_table(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        options: &ExternalTableOptions,
    ) -> ExportResult<()> {
        let sql = render_external_table(MEMORY_PROJECT, table, schema, options)?;

        let mut inner = self.inner.lock().await;
        inner.statements.push(sql);
        if inner.external_tables.contains_key(table) || inner.tables.contains_key(table) {
            bail!(ErrorKind::WarehouseQueryFailed, "Table already exists", table);
        }

        inner.external_tables.insert(
            table.clone(),
            ExternalTable {
                columns: schema.column_names().map(str::to_string).collect(),
                types: schema.columns.iter().map(|column| column.typ).collect(),
                uri: options.uri.clone(),
                max_bad_records: options.max_bad_records,
            },
        );

        Ok(())
    }

    async fn execute(&self, statement: &Statement) -> ExportResult<()> {
        let sql = render_statement(MEMORY_PROJECT, statement)?;
        info!(%sql, "running memory warehouse statement");
        self.inner.lock().await.statements.push(sql);

        match statement {
            Statement::DeletePartition { table, date } => {
                let mut inner = self.inner.lock().await;
                let Some(native) = inner.tables.get_mut(table) else {
                    bail!(ErrorKind::WarehouseQueryFailed, "Table does not exist", table);
                };
                native.partitions.remove(date);
            }
            Statement::CreatePartitionedTableAs {
                table,
                source,
                except,
                date,
            } => {
                let (columns, rows) = self.select(source, except).await?;

                let mut inner = self.inner.lock().await;
                if inner.tables.contains_key(table) {
                    bail!(ErrorKind::WarehouseQueryFailed, "Table already exists", table);
                }

                let mut native = NativeTable {
                    columns,
                    ..NativeTable::default()
                };
                native.partitions.insert(*date, rows);
                inner.tables.insert(table.clone(), native);
            }
            Statement::InsertSelect {
                table,
                source,
                except,
                date,
            } => {
                let (columns, rows) = self.select(source, except).await?;

                let mut inner = self.inner.lock().await;
                let Some(native) = inner.tables.get_mut(table) else {
                    bail!(ErrorKind::WarehouseQueryFailed, "Table does not exist", table);
                };
                if native.columns != columns {
                    bail!(
                        ErrorKind::WarehouseQueryFailed,
                        "Inserted columns do not match the table",
                        table
                    );
                }

                native.partitions.entry(*date).or_default().extend(rows);
            }
        }

        Ok(())
    }

    async fn load_json_partition(&self, load: &JsonPartitionLoad) -> ExportResult<()> {
        info!(
            table = %load.table,
            date = %load.date,
            uri = %load.uri,
            "running memory warehouse json load"
        );

        let objects = self.read_json_rows(load).await?;

        let mut inner = self.inner.lock().await;
        inner.statements.push(format!(
            "load json {} into {}.{}",
            load.uri,
            load.table.dataset,
            load.partition_table_id()
        ));
        if inner.external_tables.contains_key(&load.table) {
            bail!(
                ErrorKind::WarehouseQueryFailed,
                "Table is an external table",
                load.table
            );
        }

        let native = inner.tables.entry(load.table.clone()).or_default();
        for name in objects.iter().flat_map(Map::keys) {
            if name != PARTITION_COLUMN && !native.columns.contains(name) {
                native.columns.push(name.clone());
            }
        }

        let width = native.columns.len();
        for row in native.partitions.values_mut().flatten() {
            row.resize(width, String::new());
        }

        let rows = objects
            .iter()
            .map(|object| {
                native
                    .columns
                    .iter()
                    .map(|column| object.get(column).map(json_field).unwrap_or_default())
                    .collect()
            })
            .collect();
        native.partitions.insert(load.date, rows);

        Ok(())
    }
}
