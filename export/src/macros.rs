//! Error construction used by the stores, the warehouses and the file transforms.
//!
//! The description names the failed step ("Failed to upload staged file") and stays static so
//! failures of many files group together. What differs per call goes into the detail: the
//! object key, the table reference or the offending column and value.

/// Builds an [`crate::error::ExportError`] for the failed step `$desc`.
///
/// The detail is usually the key, path or table the step worked on. Anything implementing
/// `Display` can be passed as is; a `String` built with `format!` is moved with `detail =`.
/// A client or I/O error behind the failure goes after `source:` and shows up as a cause in
/// the exporter's report.
#[macro_export]
macro_rules! export_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ExportError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::ExportError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::ExportError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::ExportError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ExportError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::ExportError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns the error [`export_error!`] builds from the same arguments from the enclosing
/// function, which must return an [`crate::error::ExportResult`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::export_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::export_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::export_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::export_error!(
            $kind,
            $desc,
            detail = $detail,
            source: $source
        ))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::export_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::export_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
