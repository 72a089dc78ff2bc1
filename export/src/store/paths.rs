//! Object key layout of the source and staging buckets.

use crate::types::{LogicalDate, RecordType};

/// Directory under a date's staging root holding ledger markers.
pub const FILE_HISTORY_DIR: &str = "file_history";

const MESSAGES_DIR: &str = "messages";

const MESSAGES_FILE: &str = "messages.json";

/// Joins key segments with `/`, skipping empty ones and trimming stray separators.
pub fn join_key<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    segments
        .into_iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the last segment of an object key or URL path.
pub fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Prefix the vendor stream writes a date's data files under: `<prefix>/<date>/export-`.
pub fn source_listing_prefix(prefix: &str, date: &LogicalDate) -> String {
    let date = date.to_string();
    format!("{}/export-", join_key([prefix, date.as_str()]))
}

/// Key layout of everything staged for one date and schema version.
///
/// ```text
/// <prefix>/v<version>/<date>/<record-type>/<file>.csv
/// <prefix>/v<version>/<date>/file_history/<source-file-base-name>
/// <prefix>/v<version>/<date>/messages/messages.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    prefix: String,
    version: u32,
    date: LogicalDate,
}

impl StagingLayout {
    pub fn new(prefix: impl Into<String>, version: u32, date: LogicalDate) -> Self {
        Self {
            prefix: prefix.into(),
            version,
            date,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn date(&self) -> LogicalDate {
        self.date
    }

    fn key(&self, tail: &[&str]) -> String {
        let version = format!("v{}", self.version);
        let date = self.date.to_string();

        let mut segments = vec![self.prefix.as_str(), version.as_str(), date.as_str()];
        segments.extend_from_slice(tail);
        join_key(segments)
    }

    /// Root directory of the date, with a trailing `/`.
    pub fn date_root(&self) -> String {
        format!("{}/", self.key(&[]))
    }

    /// Directory holding a record type's staged files, with a trailing `/`.
    pub fn record_dir(&self, record_type: RecordType) -> String {
        format!("{}/", self.key(&[record_type.as_str()]))
    }

    /// Key of a staged file of a record type.
    pub fn staged_key(&self, record_type: RecordType, file_name: &str) -> String {
        self.key(&[record_type.as_str(), file_name])
    }

    /// Directory holding the ledger markers, with a trailing `/`.
    pub fn file_history_dir(&self) -> String {
        format!("{}/", self.key(&[FILE_HISTORY_DIR]))
    }

    /// Key of the ledger marker of a source file.
    pub fn marker_key(&self, file_base_name: &str) -> String {
        self.key(&[FILE_HISTORY_DIR, file_base_name])
    }

    /// Key of the staged message definitions.
    pub fn messages_key(&self) -> String {
        self.key(&[MESSAGES_DIR, MESSAGES_FILE])
    }

    /// URI of an object of the staging bucket, as read by the warehouse.
    pub fn object_uri(scheme: &str, bucket: &str, key: &str) -> String {
        format!("{scheme}://{bucket}/{key}")
    }

    /// URI pattern matching every staged file of a record type, as read by the warehouse.
    pub fn external_uri(&self, scheme: &str, bucket: &str, record_type: RecordType) -> String {
        Self::object_uri(scheme, bucket, &format!("{}*", self.record_dir(record_type)))
    }
}
