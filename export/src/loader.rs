//! Loading of a date's staged CSV files into partitioned destination tables.
//!
//! A load creates one external table per record type over the staged files, replaces the date
//! partition of each destination table, and drops the external tables again. Replacing the
//! partition makes a load idempotent, so a failed load is retried by running it again.
//!
//! The staged message definitions skip the external tables and go through a load job that
//! truncates their date partition.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ExportResult;
use crate::schema::SchemaRegistry;
use crate::store::paths::StagingLayout;
use crate::types::RecordType;
use crate::warehouse::naming::{destination_table, external_table, messages_table};
use crate::warehouse::{ExternalTableOptions, JsonPartitionLoad, Statement, TableRef, Warehouse};

/// Where staged files live and which tables they are loaded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    /// Bucket holding the staged files.
    pub staging_bucket: String,
    /// Scheme of external table URIs, e.g. `gs`.
    pub uri_scheme: String,
    /// Dataset of the destination tables.
    pub dataset: String,
    pub table_prefix: Option<String>,
    /// Dataset receiving the short-lived external tables.
    pub external_dataset: String,
    pub max_bad_records: i64,
}

/// Tables touched by one record type's load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub record_type: RecordType,
    pub destination: TableRef,
    /// Whether the destination table was created by this load.
    pub created: bool,
}

/// Loads staged files of a date into the warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseLoader<W> {
    warehouse: W,
    registry: Arc<SchemaRegistry>,
    target: LoadTarget,
}

impl<W> WarehouseLoader<W>
where
    W: Warehouse,
{
    pub fn new(warehouse: W, registry: Arc<SchemaRegistry>, target: LoadTarget) -> Self {
        Self {
            warehouse,
            registry,
            target,
        }
    }

    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    fn external_table(&self, layout: &StagingLayout, record_type: RecordType) -> TableRef {
        external_table(
            &self.target.external_dataset,
            &self.target.dataset,
            self.target.table_prefix.as_deref(),
            record_type,
            layout.version(),
            &layout.date(),
        )
    }

    fn destination_table(&self, layout: &StagingLayout, record_type: RecordType) -> TableRef {
        destination_table(
            &self.target.dataset,
            self.target.table_prefix.as_deref(),
            record_type,
            layout.version(),
        )
    }

    /// Loads every record type of the layout's date.
    ///
    /// Any failing step aborts the load. The external tables are dropped in every case.
    pub async fn load(&self, layout: &StagingLayout) -> ExportResult<Vec<LoadedTable>> {
        info!(
            date = %layout.date(),
            dataset = %self.target.dataset,
            "loading staged files into warehouse"
        );

        let result = self.load_tables(layout).await;

        match &result {
            Ok(_) => self.drop_external_tables(layout).await?,
            Err(err) => {
                warn!(error = %err, "warehouse load failed, dropping external tables");
                if let Err(drop_err) = self.drop_external_tables(layout).await {
                    warn!(error = %drop_err, "failed to drop external tables");
                }
            }
        }

        result
    }

    async fn load_tables(&self, layout: &StagingLayout) -> ExportResult<Vec<LoadedTable>> {
        self.create_external_tables(layout).await?;
        self.delete_existing_partitions(layout).await?;

        let mut loaded = Vec::with_capacity(RecordType::ALL.len());
        for record_type in RecordType::ALL {
            loaded.push(self.load_table(layout, record_type).await?);
        }

        Ok(loaded)
    }

    async fn create_external_tables(&self, layout: &StagingLayout) -> ExportResult<()> {
        for record_type in RecordType::ALL {
            let table = self.external_table(layout, record_type);
            let uri = layout.external_uri(
                &self.target.uri_scheme,
                &self.target.staging_bucket,
                record_type,
            );
            info!(%table, %uri, "creating external table");

            self.warehouse.drop_table(&table).await?;
            self.warehouse
                .create_external_table(
                    &table,
                    self.registry.schema(record_type),
                    &ExternalTableOptions::staged_csv(uri, self.target.max_bad_records),
                )
                .await?;
        }

        Ok(())
    }

    async fn delete_existing_partitions(&self, layout: &StagingLayout) -> ExportResult<()> {
        for record_type in RecordType::ALL {
            let table = self.destination_table(layout, record_type);
            if !self.warehouse.table_exists(&table).await? {
                info!(%table, "destination table does not exist yet, nothing to delete");
                continue;
            }

            info!(%table, date = %layout.date(), "deleting existing partition");
            self.warehouse
                .execute(&Statement::DeletePartition {
                    table,
                    date: layout.date(),
                })
                .await?;
        }

        Ok(())
    }

    async fn load_table(
        &self,
        layout: &StagingLayout,
        record_type: RecordType,
    ) -> ExportResult<LoadedTable> {
        let table = self.destination_table(layout, record_type);
        let source = self.external_table(layout, record_type);
        let schema = self.registry.schema(record_type);
        let except: Vec<String> = record_type
            .excluded_columns()
            .iter()
            .filter(|column| schema.has_column(column))
            .map(|column| column.to_string())
            .collect();

        let created = !self.warehouse.table_exists(&table).await?;
        let statement = if created {
            Statement::CreatePartitionedTableAs {
                table: table.clone(),
                source: source.clone(),
                except,
                date: layout.date(),
            }
        } else {
            Statement::InsertSelect {
                table: table.clone(),
                source: source.clone(),
                except,
                date: layout.date(),
            }
        };

        info!(%table, %source, created, "loading destination table");
        self.warehouse.execute(&statement).await?;

        Ok(LoadedTable {
            record_type,
            destination: table,
            created,
        })
    }

    /// Replaces the date partition of the messages table with the staged message definitions.
    ///
    /// Returns the messages table.
    pub async fn load_messages(&self, layout: &StagingLayout) -> ExportResult<TableRef> {
        let load = JsonPartitionLoad {
            table: messages_table(
                &self.target.dataset,
                self.target.table_prefix.as_deref(),
                layout.version(),
            ),
            date: layout.date(),
            uri: StagingLayout::object_uri(
                &self.target.uri_scheme,
                &self.target.staging_bucket,
                &layout.messages_key(),
            ),
        };

        info!(table = %load.table, uri = %load.uri, "loading message definitions");
        self.warehouse.load_json_partition(&load).await?;

        Ok(load.table)
    }

    async fn drop_external_tables(&self, layout: &StagingLayout) -> ExportResult<()> {
        for record_type in RecordType::ALL {
            let table = self.external_table(layout, record_type);
            info!(%table, "dropping external table");
            self.warehouse.drop_table(&table).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreRole;
    use crate::store::memory::MemoryObjectStore;
    use crate::types::LogicalDate;
    use crate::warehouse::memory::MemoryWarehouse;

    const SESSIONS_CSV: &str = "sessionId,lat,lon\n1,2.5,3.5\n";

    fn date() -> LogicalDate {
        "20200601".parse().unwrap()
    }

    fn target() -> LoadTarget {
        LoadTarget {
            staging_bucket: "staging".to_string(),
            uri_scheme: "gs".to_string(),
            dataset: "leanplum".to_string(),
            table_prefix: Some("firefox".to_string()),
            external_dataset: "tmp".to_string(),
            max_bad_records: 100,
        }
    }

    async fn setup() -> (MemoryWarehouse, WarehouseLoader<MemoryWarehouse>, StagingLayout) {
        let layout = StagingLayout::new("p", 1, date());
        let store = MemoryObjectStore::new(StoreRole::Staging);
        store
            .insert(
                "staging",
                &layout.staged_key(RecordType::Sessions, "sessions-a.csv"),
                SESSIONS_CSV,
            )
            .await;

        let warehouse = MemoryWarehouse::new(store);
        let registry = Arc::new(SchemaRegistry::bundled().unwrap());
        let loader = WarehouseLoader::new(warehouse.clone(), registry, target());

        (warehouse, loader, layout)
    }

    #[tokio::test]
    async fn first_load_creates_tables_and_drops_external_tables() {
        let (warehouse, loader, layout) = setup().await;

        let loaded = loader.load(&layout).await.unwrap();

        assert_eq!(loaded.len(), 6);
        assert!(loaded.iter().all(|table| table.created));
        assert!(warehouse.external_tables().await.is_empty());

        let sessions = TableRef::new("leanplum", "firefox_sessions_v1");
        let columns = warehouse.table_columns(&sessions).await.unwrap();
        assert!(!columns.iter().any(|column| column == "lat" || column == "lon"));
        assert_eq!(warehouse.partition_rows(&sessions, &date()).await.len(), 1);
    }

    #[tokio::test]
    async fn reloading_a_date_keeps_a_single_copy() {
        let (warehouse, loader, layout) = setup().await;

        loader.load(&layout).await.unwrap();
        let loaded = loader.load(&layout).await.unwrap();

        assert!(loaded.iter().all(|table| !table.created));
        let sessions = TableRef::new("leanplum", "firefox_sessions_v1");
        assert_eq!(warehouse.partition_rows(&sessions, &date()).await.len(), 1);

        let statements = warehouse.statements().await;
        assert!(statements.iter().any(|sql| sql.starts_with("delete from `memory.leanplum.firefox_sessions_v1`")));
        assert!(statements.iter().any(|sql| sql.starts_with("insert into `memory.leanplum.firefox_sessions_v1`")));
    }

    #[tokio::test]
    async fn messages_load_truncates_the_date_partition() {
        let layout = StagingLayout::new("p", 1, date());
        let store = MemoryObjectStore::new(StoreRole::Staging);
        store
            .insert(
                "staging",
                &layout.messages_key(),
                "{\"load_date\":\"2020-06-01\",\"id\":1}\n",
            )
            .await;
        let warehouse = MemoryWarehouse::new(store);
        let registry = Arc::new(SchemaRegistry::bundled().unwrap());
        let loader = WarehouseLoader::new(warehouse.clone(), registry, target());

        loader.load_messages(&layout).await.unwrap();
        let table = loader.load_messages(&layout).await.unwrap();

        assert_eq!(table, TableRef::new("leanplum", "firefox_messages_v1"));
        assert_eq!(
            warehouse.partition_rows(&table, &date()).await,
            vec![vec!["1".to_string()]]
        );
        assert_eq!(
            warehouse.statements().await,
            vec![
                "load json gs://staging/p/v1/20200601/messages/messages.json \
                 into leanplum.firefox_messages_v1$20200601"
                    .to_string();
                2
            ]
        );
        assert!(warehouse.external_tables().await.is_empty());
    }
}
