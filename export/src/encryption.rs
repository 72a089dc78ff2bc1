use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Installs the process-wide rustls crypto provider used by the HTTP clients.
///
/// Calling it more than once is a no-op.
pub fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("a crypto provider was already installed");
        }
    });
}
