use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use crate::bail;
use crate::error::{ErrorKind, ExportError, ExportResult};

/// Format of a logical date, e.g. `20200601`.
const DATE_FORMAT: &str = "%Y%m%d";

/// Calendar day an export run is about.
///
/// Always rendered as eight digits. It is the only run value interpolated into warehouse
/// statements, so parsing rejects anything that is not a valid date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalDate(NaiveDate);

impl LogicalDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn as_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for LogicalDate {
    type Err = ExportError;

    fn from_str(value: &str) -> ExportResult<Self> {
        if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
            bail!(
                ErrorKind::InvalidDate,
                "Logical date must have the form YYYYMMDD",
                value
            );
        }

        let date = NaiveDate::parse_from_str(value, DATE_FORMAT)?;

        Ok(Self(date))
    }
}

impl fmt::Display for LogicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_compact_form() {
        let date: LogicalDate = "20200601".parse().unwrap();

        assert_eq!(date.to_string(), "20200601");
        assert_eq!(date.as_naive_date(), NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    }

    #[test]
    fn rejects_malformed_dates() {
        for value in ["2020-06-01", "2020061", "20201301", "2020060a", "20200601'"] {
            let err = value.parse::<LogicalDate>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidDate, "{value}");
        }
    }
}
