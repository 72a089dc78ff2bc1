use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

fn default_api_url() -> String {
    VendorApiConfig::DEFAULT_API_URL.to_string()
}

fn default_api_version() -> String {
    VendorApiConfig::DEFAULT_API_VERSION.to_string()
}

const fn default_poll_interval_ms() -> u64 {
    VendorApiConfig::DEFAULT_POLL_INTERVAL_MS
}

/// Credentials and polling behaviour for the vendor's export API.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorApiConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub app_id: String,
    /// Export-scoped client key of the app.
    pub client_key: SecretString,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Fixed delay between two export status checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl VendorApiConfig {
    pub const DEFAULT_API_URL: &'static str = "https://api.leanplum.com/api";

    pub const DEFAULT_API_VERSION: &'static str = "1.0.6";

    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.app_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("vendor.app_id"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroPollInterval);
        }

        Ok(())
    }
}
