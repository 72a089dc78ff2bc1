//! Error types and result definitions for export operations.
//!
//! Every fallible operation of the pipeline returns an [`ExportError`]. The error carries a
//! classification, a static description, optional dynamic detail, and the call site it was
//! created at. Failures of concurrent file workers are aggregated into a single error.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the export pipeline.
#[derive(Debug, Clone)]
pub struct ExportError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures collected from several file workers.
    Many {
        errors: Vec<ExportError>,
        location: &'static Location<'static>,
    },
}

/// Classification of export failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigError,
    UnknownRecordType,
    InvalidDate,

    // Vendor Errors
    VendorApiFailed,
    VendorExportFailed,
    InvalidExportFileUrl,

    // Record Errors
    InvalidData,
    DeserializationError,

    // Storage Errors
    SourceIoError,
    StagingIoError,

    // Warehouse Errors
    WarehouseQueryFailed,
    AuthenticationError,

    // Local Errors
    IoError,
    SerializationError,
    TransformWorkerPanic,

    Unknown,
}

impl ExportError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the aggregated errors, if this is an aggregate.
    pub fn errors(&self) -> Option<&[ExportError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the dynamic detail, or the first one found in an aggregate.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the static description of a single error.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured backtrace for single errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the location where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error.
    ///
    /// Has no effect on aggregates, which expose their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ExportError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        ExportError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for ExportError {
    fn eq(&self, other: &ExportError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_block(f, "Detail", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_block(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes an indented, titled block of lines.
fn write_block(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    if body.trim().is_empty() {
        return write!(f, "\n  {title}: <empty>");
    }

    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for ExportError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ExportError {
        ExportError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for ExportError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ExportError {
        ExportError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned unwrapped.
impl<E> From<Vec<E>> for ExportError
where
    E: Into<ExportError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ExportError {
        let location = Location::caller();

        let errors: Vec<ExportError> = errors.into_iter().map(Into::into).collect();
        match <[ExportError; 1]>::try_from(errors) {
            Ok([error]) => error,
            Err(errors) => ExportError {
                repr: ErrorRepr::Many { errors, location },
            },
        }
    }
}

impl From<std::io::Error> for ExportError {
    #[track_caller]
    fn from(err: std::io::Error) -> ExportError {
        ExportError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

/// Maps JSON syntax and data errors to [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for ExportError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ExportError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        ExportError::from_source(kind, description, err)
    }
}

impl From<csv::Error> for ExportError {
    #[track_caller]
    fn from(err: csv::Error) -> ExportError {
        let (kind, description) = if err.is_io_error() {
            (ErrorKind::IoError, "CSV I/O operation failed")
        } else {
            (ErrorKind::SerializationError, "CSV serialization failed")
        };

        ExportError::from_source(kind, description, err)
    }
}

impl From<std::num::ParseIntError> for ExportError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> ExportError {
        ExportError::from_source(ErrorKind::InvalidData, "Integer parsing failed", err)
    }
}

impl From<chrono::ParseError> for ExportError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> ExportError {
        ExportError::from_source(ErrorKind::InvalidDate, "Date parsing failed", err)
    }
}

/// Maps HTTP failures of the vendor API.
impl From<reqwest::Error> for ExportError {
    #[track_caller]
    fn from(err: reqwest::Error) -> ExportError {
        let description = if err.is_decode() {
            "Vendor API response could not be decoded"
        } else if err.is_status() {
            "Vendor API returned an error status"
        } else {
            "Vendor API request failed"
        };

        ExportError::from_source(ErrorKind::VendorApiFailed, description, err)
    }
}

/// Maps a failed blocking or worker task.
impl From<tokio::task::JoinError> for ExportError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> ExportError {
        let description = if err.is_panic() {
            "Transform worker panicked"
        } else {
            "Transform worker was cancelled"
        };

        ExportError::from_source(ErrorKind::TransformWorkerPanic, description, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, export_error};

    #[test]
    fn single_error_reports_kind_and_detail() {
        let err = export_error!(ErrorKind::InvalidData, "Missing session id", "line 3");

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(err.detail(), Some("line 3"));
        assert_eq!(err.description(), Some("Missing session id"));
        assert!(err.to_string().starts_with("[InvalidData] Missing session id @ "));
    }

    #[test]
    fn aggregate_flattens_kinds() {
        let err = ExportError::from(vec![
            export_error!(ErrorKind::SourceIoError, "Download failed"),
            export_error!(ErrorKind::InvalidData, "Bad record"),
        ]);

        assert_eq!(err.kind(), ErrorKind::SourceIoError);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SourceIoError, ErrorKind::InvalidData]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn aggregate_of_one_is_unwrapped() {
        let err = ExportError::from(vec![export_error!(
            ErrorKind::StagingIoError,
            "Upload failed"
        )]);

        assert_eq!(err.kinds(), vec![ErrorKind::StagingIoError]);
        assert!(err.backtrace().is_some());
    }

    #[test]
    fn bail_returns_early() {
        fn check(value: i64) -> ExportResult<i64> {
            if value < 0 {
                bail!(ErrorKind::InvalidData, "Negative value", value);
            }
            Ok(value)
        }

        assert_eq!(check(3).unwrap(), 3);
        assert_eq!(check(-1).unwrap_err().detail(), Some("-1"));
    }

    #[test]
    fn json_errors_are_deserialization_errors() {
        let err: ExportError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
        assert!(error::Error::source(&err).is_some());
    }
}
