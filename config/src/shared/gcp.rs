use secrecy::SecretString;
use serde::Deserialize;

/// Google Cloud settings used by the warehouse client.
#[derive(Debug, Clone, Deserialize)]
pub struct GcpConfig {
    /// Project that owns the destination datasets and runs the query jobs.
    pub project_id: String,
    /// Service account key in JSON form.
    ///
    /// When absent, application default credentials are used.
    #[serde(default)]
    pub service_account_key: Option<SecretString>,
}
