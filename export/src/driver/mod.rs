//! Top-level orchestration of an export run.
//!
//! A run acquires a date's session data in one of two ways, stages it as CSV, and loads it
//! into the warehouse. The acquisition mode is chosen once, when the [`Exporter`] is built.
//! The vendor's message definitions are snapshotted separately by a [`MessagesExporter`].

mod historical;
mod messages;
mod stream;

pub use historical::*;
pub use messages::*;
pub use stream::*;

use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

use crate::error::{ErrorKind, ExportResult};
use crate::export_error;
use crate::loader::LoadedTable;
use crate::store::ObjectStore;
use crate::store::paths::StagingLayout;
use crate::types::{LogicalDate, RecordType};
use crate::vendor::ExportApi;
use crate::warehouse::Warehouse;

/// Values identifying one run, shared by every mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRun {
    pub date: LogicalDate,
    /// Bucket receiving staged files and ledger markers.
    pub staging_bucket: String,
    /// Key prefix of source files and staged files.
    pub prefix: String,
    /// Version of the staged layout and destination tables.
    pub version: u32,
}

impl ExportRun {
    pub fn layout(&self) -> StagingLayout {
        StagingLayout::new(self.prefix.clone(), self.version, self.date)
    }
}

/// Outcome of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Source files found for the date.
    pub files_seen: usize,
    /// Source files skipped because the ledger lists them.
    pub files_skipped: usize,
    pub files_transformed: usize,
    /// Rows staged per record type by this run.
    pub rows: BTreeMap<RecordType, usize>,
    pub loaded: Vec<LoadedTable>,
}

impl ExportSummary {
    pub(crate) fn add_rows<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (RecordType, usize)>,
    {
        for (record_type, count) in rows {
            *self.rows.entry(record_type).or_default() += count;
        }
    }

    pub fn rows_for(&self, record_type: RecordType) -> usize {
        self.rows.get(&record_type).copied().unwrap_or_default()
    }
}

/// Creates a scratch directory, inside `parent` when given.
pub(crate) fn scratch_dir(parent: Option<&Path>) -> ExportResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("export-");

    let dir = match parent {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    };

    dir.map_err(|err| {
        export_error!(
            ErrorKind::IoError,
            "Failed to create scratch directory",
            parent.map(Path::display).map(|p| p.to_string()).unwrap_or_default(),
            source: err
        )
    })
}

/// Export strategy of a run.
#[derive(Debug)]
pub enum Exporter<Src, Stg, W, A> {
    /// Requests an export from the vendor API and loads the files it produces.
    Historical(HistoricalExporter<A, Stg, W>),
    /// Transforms the session files the vendor streamed into the source bucket.
    Stream(StreamExporter<Src, Stg, W>),
}

impl<Src, Stg, W, A> Exporter<Src, Stg, W, A>
where
    Src: ObjectStore + Clone + Send + Sync + 'static,
    Stg: ObjectStore + Clone + Send + Sync + 'static,
    W: Warehouse,
    A: ExportApi,
{
    pub async fn run(&self) -> ExportResult<ExportSummary> {
        match self {
            Exporter::Historical(exporter) => exporter.run().await,
            Exporter::Stream(exporter) => exporter.run().await,
        }
    }
}
