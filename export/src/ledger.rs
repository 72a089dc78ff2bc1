//! Per-date record of the source files whose output is fully staged.
//!
//! A file counts as imported once its zero-length marker exists under
//! `<prefix>/v<version>/<date>/file_history/`. Output is staged before the marker is written,
//! so an interrupted run reprocesses the file instead of losing it.

use bytes::Bytes;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::ExportResult;
use crate::store::paths::{StagingLayout, base_name};
use crate::store::{ObjectStore, delete_prefix, list_all};

/// Import ledger stored as marker objects in the staging bucket.
#[derive(Debug, Clone)]
pub struct ImportLedger<S> {
    store: S,
    bucket: String,
    layout: StagingLayout,
    page_size: Option<i32>,
}

impl<S> ImportLedger<S>
where
    S: ObjectStore,
{
    pub fn new(store: S, bucket: impl Into<String>, layout: StagingLayout) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            layout,
            page_size: None,
        }
    }

    /// Overrides the listing page size.
    pub fn with_page_size(mut self, page_size: Option<i32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    /// Returns the base names of the source files already imported for the date.
    pub async fn already_imported(&self) -> ExportResult<HashSet<String>> {
        let file_history_dir = self.layout.file_history_dir();

        let markers = list_all(&self.store, &self.bucket, &file_history_dir, self.page_size).await?;
        let imported: HashSet<String> = markers
            .iter()
            .map(|key| base_name(key))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        info!(
            bucket = %self.bucket,
            %file_history_dir,
            imported = imported.len(),
            "read import ledger"
        );

        Ok(imported)
    }

    /// Records a source file as imported.
    ///
    /// Must only be called once all of the file's output is staged.
    pub async fn mark_imported(&self, file_base_name: &str) -> ExportResult<()> {
        let marker_key = self.layout.marker_key(file_base_name);
        info!(bucket = %self.bucket, %marker_key, "marking file as imported");

        self.store
            .put(&self.bucket, &marker_key, Bytes::new())
            .await
    }

    /// Deletes all staged output and markers of the date.
    ///
    /// Returns the number of deleted objects.
    pub async fn clear(&self) -> ExportResult<usize> {
        let date_root = self.layout.date_root();
        warn!(bucket = %self.bucket, %date_root, "deleting staged output and import ledger");

        delete_prefix(&self.store, &self.bucket, &date_root, self.page_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryObjectStore;

    fn ledger(store: &MemoryObjectStore) -> ImportLedger<MemoryObjectStore> {
        let layout = StagingLayout::new("firefox", 1, "20200601".parse().unwrap());
        ImportLedger::new(store.clone(), "staging", layout).with_page_size(Some(1))
    }

    #[tokio::test]
    async fn marked_files_are_listed() {
        let store = MemoryObjectStore::default();
        let ledger = ledger(&store);

        ledger.mark_imported("export-1-abc-output-0").await.unwrap();
        ledger.mark_imported("export-1-abc-output-1").await.unwrap();

        let imported = ledger.already_imported().await.unwrap();
        assert_eq!(imported.len(), 2);
        assert!(imported.contains("export-1-abc-output-0"));
        assert!(
            store
                .get("staging", "firefox/v1/20200601/file_history/export-1-abc-output-1")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn clear_removes_markers_and_staged_files_of_the_date_only() {
        let store = MemoryObjectStore::default();
        let ledger = ledger(&store);
        ledger.mark_imported("export-1-abc-output-0").await.unwrap();
        store
            .insert("staging", "firefox/v1/20200601/sessions/abc-output-0.csv", "x")
            .await;
        store
            .insert("staging", "firefox/v1/20200602/sessions/abc-output-0.csv", "x")
            .await;

        let deleted = ledger.clear().await.unwrap();

        assert_eq!(deleted, 2);
        assert!(ledger.already_imported().await.unwrap().is_empty());
        assert_eq!(
            store.keys("staging").await,
            ["firefox/v1/20200602/sessions/abc-output-0.csv"]
        );
    }
}
