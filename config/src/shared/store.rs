use secrecy::SecretString;
use serde::Deserialize;

fn default_region() -> String {
    ObjectStoreConfig::DEFAULT_REGION.to_string()
}

fn default_uri_scheme() -> String {
    StagingStoreConfig::DEFAULT_URI_SCHEME.to_string()
}

/// Connection settings for an S3-compatible object store.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint, e.g. `https://storage.googleapis.com` for GCS interoperability.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Static credentials. The default provider chain is used when absent.
    #[serde(default)]
    pub access_key_id: Option<SecretString>,
    #[serde(default)]
    pub secret_access_key: Option<SecretString>,
    /// Forces path-style addressing, needed by most non-AWS endpoints.
    #[serde(default)]
    pub force_path_style: bool,
}

impl ObjectStoreConfig {
    pub const DEFAULT_REGION: &'static str = "us-west-2";
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

/// Object store receiving staged files, plus the URI scheme the warehouse reads them with.
#[derive(Debug, Clone, Deserialize)]
pub struct StagingStoreConfig {
    #[serde(flatten)]
    pub store: ObjectStoreConfig,
    #[serde(default = "default_uri_scheme")]
    pub uri_scheme: String,
}

impl StagingStoreConfig {
    pub const DEFAULT_URI_SCHEME: &'static str = "gs";
}

impl Default for StagingStoreConfig {
    fn default() -> Self {
        Self {
            store: ObjectStoreConfig::default(),
            uri_scheme: default_uri_scheme(),
        }
    }
}
