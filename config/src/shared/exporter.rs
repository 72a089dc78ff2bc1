use serde::Deserialize;
use thiserror::Error;

use crate::shared::{
    GcpConfig, ObjectStoreConfig, StagingStoreConfig, TransformConfig, VendorApiConfig,
    WarehouseConfig,
};

/// Errors found when validating an [`ExporterConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`transform.max_concurrent_files` must be greater than zero")]
    ZeroConcurrentFiles,

    #[error("`warehouse.max_bad_records` must not be negative, got {0}")]
    NegativeMaxBadRecords(i64),

    #[error("`vendor.poll_interval_ms` must be greater than zero")]
    ZeroPollInterval,

    #[error("the historical and messages commands require a `vendor` configuration section")]
    MissingVendorConfig,

    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Complete configuration of the exporter process.
///
/// Run-specific values (date, buckets, dataset) come from the command line; everything that
/// describes the environment the exporter runs in lives here.
///
/// This intentionally does not implement `Serialize` so secrets cannot leak through it.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    pub gcp: GcpConfig,
    /// Object store the vendor delivers streamed session files to.
    #[serde(default)]
    pub source: ObjectStoreConfig,
    /// Object store that receives staged CSV files and ledger markers.
    #[serde(default)]
    pub staging: StagingStoreConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    /// Vendor export API settings, only needed by the historical export.
    #[serde(default)]
    pub vendor: Option<VendorApiConfig>,
}

impl ExporterConfig {
    /// Validates settings shared by both export modes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.gcp.project_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("gcp.project_id"));
        }
        if self.warehouse.external_dataset.trim().is_empty() {
            return Err(ValidationError::EmptyField("warehouse.external_dataset"));
        }
        if self.warehouse.max_bad_records < 0 {
            return Err(ValidationError::NegativeMaxBadRecords(
                self.warehouse.max_bad_records,
            ));
        }
        if self.transform.max_concurrent_files == 0 {
            return Err(ValidationError::ZeroConcurrentFiles);
        }
        if let Some(vendor) = &self.vendor {
            vendor.validate()?;
        }

        Ok(())
    }

    /// Returns the vendor settings, failing when the section is absent.
    pub fn require_vendor(&self) -> Result<&VendorApiConfig, ValidationError> {
        self.vendor
            .as_ref()
            .ok_or(ValidationError::MissingVendorConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ExporterConfig {
        serde_json::from_value(serde_json::json!({
            "gcp": { "project_id": "moz-fx-data" }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let config = minimal();

        assert_eq!(config.warehouse.external_dataset, "tmp");
        assert_eq!(config.warehouse.max_bad_records, 100);
        assert_eq!(config.transform.max_concurrent_files, 1);
        assert_eq!(config.staging.uri_scheme, "gs");
        assert!(config.vendor.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = minimal();
        config.transform.max_concurrent_files = 0;

        assert_eq!(config.validate(), Err(ValidationError::ZeroConcurrentFiles));
    }

    #[test]
    fn missing_vendor_section_is_reported() {
        let config = minimal();

        assert_eq!(
            config.require_vendor().unwrap_err(),
            ValidationError::MissingVendorConfig
        );
    }
}
