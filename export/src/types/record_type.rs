use std::fmt;
use std::str::FromStr;

use crate::bail;
use crate::error::{ErrorKind, ExportError, ExportResult};

/// One of the six flat tables a session record is split into.
///
/// Variants are declared in the canonical processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    EventParameters,
    Events,
    Experiments,
    Sessions,
    States,
    UserAttributes,
}

impl RecordType {
    /// All record types in canonical order.
    pub const ALL: [RecordType; 6] = [
        RecordType::EventParameters,
        RecordType::Events,
        RecordType::Experiments,
        RecordType::Sessions,
        RecordType::States,
        RecordType::UserAttributes,
    ];

    /// Returns the canonical lowercase name used in paths, file names and table names.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::EventParameters => "eventparameters",
            RecordType::Events => "events",
            RecordType::Experiments => "experiments",
            RecordType::Sessions => "sessions",
            RecordType::States => "states",
            RecordType::UserAttributes => "userattributes",
        }
    }

    /// Columns the loader leaves out when copying into the destination table.
    pub fn excluded_columns(&self) -> &'static [&'static str] {
        match self {
            RecordType::Sessions => &["lat", "lon"],
            _ => &[],
        }
    }
}

impl FromStr for RecordType {
    type Err = ExportError;

    fn from_str(value: &str) -> ExportResult<Self> {
        match RecordType::ALL
            .into_iter()
            .find(|record_type| record_type.as_str() == value)
        {
            Some(record_type) => Ok(record_type),
            None => bail!(
                ErrorKind::UnknownRecordType,
                "Unrecognized record type",
                value
            ),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_in_canonical_order() {
        let names: Vec<_> = RecordType::ALL.iter().map(RecordType::as_str).collect();

        assert_eq!(
            names,
            [
                "eventparameters",
                "events",
                "experiments",
                "sessions",
                "states",
                "userattributes"
            ]
        );
        for record_type in RecordType::ALL {
            assert_eq!(record_type.as_str().parse::<RecordType>().unwrap(), record_type);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "messages".parse::<RecordType>().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownRecordType);
        assert_eq!(err.detail(), Some("messages"));
    }
}
