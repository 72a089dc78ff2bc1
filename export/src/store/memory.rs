use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ExportResult;
use crate::export_error;
use crate::store::{DEFAULT_PAGE_SIZE, ListPage, ObjectStore, StoreRole};

#[derive(Debug, Default)]
struct Inner {
    buckets: HashMap<String, BTreeMap<String, Bytes>>,
    downloads: Vec<String>,
    uploads: Vec<String>,
}

/// Object store keeping every object in memory.
///
/// Listing follows S3 semantics: keys come back in lexicographic order and the continuation
/// token is the last key of the previous page. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    role: StoreRole,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryObjectStore {
    pub fn new(role: StoreRole) -> Self {
        Self {
            role,
            inner: Arc::default(),
        }
    }

    /// Returns a handle on the same objects that reports errors for another role.
    pub fn with_role(&self, role: StoreRole) -> Self {
        Self {
            role,
            inner: Arc::clone(&self.inner),
        }
    }

    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        let mut inner = self.inner.lock().await;
        inner
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.lock().await;
        inner.buckets.get(bucket)?.get(key).cloned()
    }

    /// Returns every key of a bucket in lexicographic order.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every object under `prefix` in lexicographic key order.
    pub async fn objects_under(&self, bucket: &str, prefix: &str) -> Vec<(String, Bytes)> {
        let inner = self.inner.lock().await;
        inner
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(key, _)| key.starts_with(prefix))
                    .map(|(key, body)| (key.clone(), body.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys downloaded so far, in call order.
    pub async fn downloads(&self) -> Vec<String> {
        self.inner.lock().await.downloads.clone()
    }

    /// Keys uploaded from files so far, in call order.
    pub async fn uploads(&self) -> Vec<String> {
        self.inner.lock().await.uploads.clone()
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        page_size: Option<i32>,
    ) -> ExportResult<ListPage> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as usize;
        let inner = self.inner.lock().await;

        let Some(objects) = inner.buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        let mut matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| {
                continuation_token
                    .as_deref()
                    .is_none_or(|token| key.as_str() > token)
            });

        let keys: Vec<String> = matching.by_ref().take(page_size).cloned().collect();
        let next_continuation_token = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };

        Ok(ListPage {
            keys,
            next_continuation_token,
        })
    }

    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> ExportResult<()> {
        let body = {
            let mut inner = self.inner.lock().await;
            inner.downloads.push(key.to_string());
            inner
                .buckets
                .get(bucket)
                .and_then(|objects| objects.get(key))
                .cloned()
        };

        let Some(body) = body else {
            return Err(export_error!(
                self.role.error_kind(),
                "Object does not exist",
                format!("{bucket}/{key}")
            ));
        };

        tokio::fs::write(destination, &body).await?;

        Ok(())
    }

    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> ExportResult<()> {
        let body = tokio::fs::read(source).await.map_err(|err| {
            export_error!(
                self.role.error_kind(),
                "Failed to read file for upload",
                source.display(),
                source: err
            )
        })?;

        self.inner.lock().await.uploads.push(key.to_string());
        self.insert(bucket, key, body).await;

        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> ExportResult<()> {
        self.insert(bucket, key, body).await;

        Ok(())
    }

    async fn delete(&self, bucket: &str, keys: &[String]) -> ExportResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(objects) = inner.buckets.get_mut(bucket) {
            for key in keys {
                objects.remove(key);
            }
        }

        Ok(())
    }
}
