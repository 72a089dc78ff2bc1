//! Discovery of the vendor's data files for a date in the source bucket.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::ExportResult;
use crate::store::paths::{join_key, source_listing_prefix};
use crate::store::{ObjectStore, list_all};
use crate::types::LogicalDate;

/// Shape of a data file key: `[<anything>/]<YYYYMMDD>/export-<anything>-output-<n>`.
static DATA_FILE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*/)?\d{8}/export-.*-output-[0-9]+$").expect("data file pattern is valid")
});

/// Returns whether a key names a data file of `date` directly under `<prefix>/<date>/`.
pub fn is_data_file(key: &str, prefix: &str, date: &LogicalDate) -> bool {
    let date = date.to_string();
    let directory = format!("{}/", join_key([prefix, date.as_str()]));

    DATA_FILE_KEY.is_match(key)
        && key
            .strip_prefix(&directory)
            .is_some_and(|name| !name.contains('/'))
}

/// Lists the data files the vendor stream delivered for `date`.
///
/// Follows continuation tokens until the listing is exhausted. Markers, manifests and files
/// of other prefixes or dates are filtered out. `page_size` overrides the store's default
/// page size.
pub async fn list_data_files<S>(
    store: &S,
    date: &LogicalDate,
    bucket: &str,
    prefix: &str,
    page_size: Option<i32>,
) -> ExportResult<Vec<String>>
where
    S: ObjectStore,
{
    let listing_prefix = source_listing_prefix(prefix, date);
    info!(bucket, %listing_prefix, "listing data files");

    let keys = list_all(store, bucket, &listing_prefix, page_size).await?;
    let listed = keys.len();

    let data_files: Vec<String> = keys
        .into_iter()
        .filter(|key| {
            let keep = is_data_file(key, prefix, date);
            if !keep {
                debug!(key, "skipping object that is not a data file");
            }
            keep
        })
        .collect();

    info!(listed, data_files = data_files.len(), "listed data files");

    Ok(data_files)
}
