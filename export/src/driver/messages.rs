use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::driver::ExportRun;
use crate::error::ExportResult;
use crate::loader::WarehouseLoader;
use crate::store::ObjectStore;
use crate::vendor::{Message, MessagesApi};
use crate::warehouse::{PARTITION_COLUMN, TableRef, Warehouse};

/// Outcome of a messages run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagesSummary {
    /// Message definitions the vendor returned.
    pub messages: usize,
    /// Table whose date partition was replaced, `None` when there was nothing to load.
    pub destination: Option<TableRef>,
}

/// Exporter snapshotting the vendor's message definitions into a date partition.
///
/// Every definition gets the run date as `load_date`, is staged as one line of JSON, and the
/// staged file replaces the date's partition of the messages table.
#[derive(Debug)]
pub struct MessagesExporter<A, Stg, W> {
    api: A,
    staging: Stg,
    loader: WarehouseLoader<W>,
    run: ExportRun,
}

impl<A, Stg, W> MessagesExporter<A, Stg, W>
where
    A: MessagesApi,
    Stg: ObjectStore,
    W: Warehouse,
{
    pub fn new(api: A, staging: Stg, loader: WarehouseLoader<W>, run: ExportRun) -> Self {
        Self {
            api,
            staging,
            loader,
            run,
        }
    }

    pub async fn run(&self) -> ExportResult<MessagesSummary> {
        let layout = self.run.layout();
        info!(
            date = %self.run.date,
            staging_bucket = %self.run.staging_bucket,
            prefix = %self.run.prefix,
            version = self.run.version,
            "starting messages export"
        );

        let messages = self.api.messages().await?;
        let count = messages.len();
        if messages.is_empty() {
            warn!("vendor returned no messages, leaving the messages table untouched");
            return Ok(MessagesSummary {
                messages: 0,
                destination: None,
            });
        }

        let body = self.render(messages)?;
        let key = layout.messages_key();
        info!(bucket = %self.run.staging_bucket, %key, messages = count, "staging messages");
        self.staging
            .put(&self.run.staging_bucket, &key, Bytes::from(body))
            .await?;

        let destination = self.loader.load_messages(&layout).await?;

        info!(messages = count, %destination, "messages export finished");

        Ok(MessagesSummary {
            messages: count,
            destination: Some(destination),
        })
    }

    /// Renders the messages as newline-delimited JSON, each led by the run's `load_date`.
    ///
    /// A `load_date` field of the message itself is dropped.
    fn render(&self, messages: Vec<Message>) -> ExportResult<Vec<u8>> {
        let load_date = Value::String(self.run.date.as_naive_date().to_string());

        let mut body = Vec::new();
        for message in messages {
            let mut row = Map::with_capacity(message.len() + 1);
            row.insert(PARTITION_COLUMN.to_string(), load_date.clone());
            row.extend(
                message
                    .into_iter()
                    .filter(|(name, _)| name != PARTITION_COLUMN),
            );

            serde_json::to_writer(&mut body, &row)?;
            body.push(b'\n');
        }

        Ok(body)
    }
}
