//! Names of destination and external tables.

use std::fmt;

use crate::types::{LogicalDate, RecordType};
use crate::warehouse::TableRef;

/// Base name of the table holding the vendor's message definitions.
pub const MESSAGES_TABLE: &str = "messages";

/// Returns `[<table_prefix>_]<base>_v<version>`.
fn versioned_name(table_prefix: Option<&str>, base: impl fmt::Display, version: u32) -> String {
    match table_prefix.filter(|prefix| !prefix.is_empty()) {
        Some(prefix) => format!("{prefix}_{base}_v{version}"),
        None => format!("{base}_v{version}"),
    }
}

/// Returns `[<table_prefix>_]<record-type>_v<version>`.
pub fn table_name(table_prefix: Option<&str>, record_type: RecordType, version: u32) -> String {
    versioned_name(table_prefix, record_type, version)
}

/// Returns the destination table of a record type.
pub fn destination_table(
    dataset: &str,
    table_prefix: Option<&str>,
    record_type: RecordType,
    version: u32,
) -> TableRef {
    TableRef::new(dataset, table_name(table_prefix, record_type, version))
}

/// Returns the destination table of the message definitions.
pub fn messages_table(dataset: &str, table_prefix: Option<&str>, version: u32) -> TableRef {
    TableRef::new(dataset, versioned_name(table_prefix, MESSAGES_TABLE, version))
}

/// Returns the external table of a record type for one date.
///
/// The name is `<dataset>_[<table_prefix>_]<record-type>_v<version>_<date>` so that loads into
/// different datasets can share the external dataset.
pub fn external_table(
    external_dataset: &str,
    dataset: &str,
    table_prefix: Option<&str>,
    record_type: RecordType,
    version: u32,
    date: &LogicalDate,
) -> TableRef {
    let name = table_name(table_prefix, record_type, version);
    TableRef::new(external_dataset, format!("{dataset}_{name}_{date}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> LogicalDate {
        "20200601".parse().unwrap()
    }

    #[test]
    fn destination_table_with_and_without_prefix() {
        assert_eq!(
            destination_table("leanplum", None, RecordType::Sessions, 1).to_string(),
            "leanplum.sessions_v1"
        );
        assert_eq!(
            destination_table("leanplum", Some("firefox"), RecordType::Events, 2).to_string(),
            "leanplum.firefox_events_v2"
        );
        assert_eq!(
            destination_table("leanplum", Some(""), RecordType::States, 1).to_string(),
            "leanplum.states_v1"
        );
    }

    #[test]
    fn messages_table_follows_record_type_naming() {
        assert_eq!(
            messages_table("leanplum", Some("firefox"), 2).to_string(),
            "leanplum.firefox_messages_v2"
        );
        assert_eq!(messages_table("leanplum", None, 1).to_string(), "leanplum.messages_v1");
    }

    #[test]
    fn external_table_is_scoped_by_dataset_and_date() {
        let table = external_table(
            "tmp",
            "leanplum",
            Some("firefox"),
            RecordType::UserAttributes,
            1,
            &date(),
        );

        assert_eq!(table.to_string(), "tmp.leanplum_firefox_userattributes_v1_20200601");
    }
}
