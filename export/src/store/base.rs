use bytes::Bytes;
use std::future::Future;
use std::path::Path;
use tracing::info;

use crate::error::{ErrorKind, ExportResult};

/// Largest number of keys a single listing page returns by default.
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Which side of the pipeline an object store serves.
///
/// Determines the [`ErrorKind`] reported for failed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreRole {
    /// The bucket the vendor delivers session files to.
    Source,
    /// The bucket receiving staged CSV files and ledger markers.
    #[default]
    Staging,
}

impl StoreRole {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            StoreRole::Source => ErrorKind::SourceIoError,
            StoreRole::Staging => ErrorKind::StagingIoError,
        }
    }
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token to pass to the next call, present only when the listing is truncated.
    pub next_continuation_token: Option<String>,
}

impl ListPage {
    pub fn is_truncated(&self) -> bool {
        self.next_continuation_token.is_some()
    }
}

/// Minimal object storage interface used by the pipeline.
///
/// Implementations exist for S3-compatible services and for memory.
pub trait ObjectStore {
    /// Lists one page of keys starting with `prefix`, in lexicographic order.
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        page_size: Option<i32>,
    ) -> impl Future<Output = ExportResult<ListPage>> + Send;

    /// Downloads a whole object into a local file, replacing it.
    fn download(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> impl Future<Output = ExportResult<()>> + Send;

    /// Uploads a local file as an object.
    fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> impl Future<Output = ExportResult<()>> + Send;

    /// Writes an object from memory.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> impl Future<Output = ExportResult<()>> + Send;

    /// Deletes the given keys. Missing keys are not an error.
    fn delete(&self, bucket: &str, keys: &[String])
    -> impl Future<Output = ExportResult<()>> + Send;
}

/// Lists every key under `prefix`, following continuation tokens until the listing ends.
pub async fn list_all<S>(
    store: &S,
    bucket: &str,
    prefix: &str,
    page_size: Option<i32>,
) -> ExportResult<Vec<String>>
where
    S: ObjectStore,
{
    let mut keys = Vec::new();
    let mut continuation_token = None;

    loop {
        let page = store
            .list_page(bucket, prefix, continuation_token, page_size)
            .await?;
        keys.extend(page.keys);

        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    Ok(keys)
}

/// Deletes every object under `prefix`, one listing page at a time.
///
/// Returns the number of deleted objects.
pub async fn delete_prefix<S>(
    store: &S,
    bucket: &str,
    prefix: &str,
    page_size: Option<i32>,
) -> ExportResult<usize>
where
    S: ObjectStore,
{
    info!(bucket, prefix, "deleting objects under prefix");

    let keys = list_all(store, bucket, prefix, page_size).await?;
    let chunk_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as usize;
    for chunk in keys.chunks(chunk_size) {
        store.delete(bucket, chunk).await?;
    }

    Ok(keys.len())
}
