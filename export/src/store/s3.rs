use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Region, RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use config::shared::ObjectStoreConfig;
use secrecy::ExposeSecret;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ExportError, ExportResult};
use crate::export_error;
use crate::store::{ListPage, ObjectStore, StoreRole};

/// Name reported for credentials coming from the configuration file.
const STATIC_CREDENTIALS_PROVIDER: &str = "exporter-config";

/// Object store backed by an S3-compatible API.
///
/// Serves both the vendor's S3 bucket and the GCS staging bucket, which is reached through
/// the GCS XML interoperability endpoint with HMAC keys.
#[derive(Clone)]
pub struct S3ObjectStore {
    role: StoreRole,
    client: Client,
}

impl S3ObjectStore {
    /// Builds a client from the shared AWS configuration, overridden by `config`.
    pub async fn new(config: &ObjectStoreConfig, role: StoreRole) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.expose_secret(),
                secret_access_key.expose_secret(),
                None,
                None,
                STATIC_CREDENTIALS_PROVIDER,
            ));
        }

        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(config.force_path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
        if let Some(endpoint_url) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        info!(
            ?role,
            region = %config.region,
            endpoint_url = ?config.endpoint_url,
            "created object store client"
        );

        Self {
            role,
            client: Client::from_conf(builder.build()),
        }
    }

    fn error<E>(&self, description: &'static str, bucket: &str, key: &str, err: E) -> ExportError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        export_error!(
            self.role.error_kind(),
            description,
            format!("s3://{bucket}/{key}: {}", DisplayErrorContext(&err)),
            source: err
        )
    }
}

impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
        page_size: Option<i32>,
    ) -> ExportResult<ListPage> {
        debug!(bucket, prefix, ?continuation_token, "listing objects");

        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .set_max_keys(page_size)
            .send()
            .await
            .map_err(|err| self.error("Failed to list objects", bucket, prefix, err))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();

        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            keys,
            next_continuation_token,
        })
    }

    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> ExportResult<()> {
        info!(bucket, key, destination = %destination.display(), "downloading object");

        let mut output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.error("Failed to download object", bucket, key, err))?;

        let mut file = tokio::fs::File::create(destination).await?;
        while let Some(chunk) = output
            .body
            .try_next()
            .await
            .map_err(|err| self.error("Failed to read object body", bucket, key, err))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    async fn upload(&self, bucket: &str, key: &str, source: &Path) -> ExportResult<()> {
        info!(bucket, key, source = %source.display(), "uploading file");

        let body = ByteStream::from_path(source)
            .await
            .map_err(|err| self.error("Failed to open file for upload", bucket, key, err))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| self.error("Failed to upload object", bucket, key, err))?;

        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> ExportResult<()> {
        debug!(bucket, key, size = body.len(), "writing object");

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| self.error("Failed to write object", bucket, key, err))?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, keys: &[String]) -> ExportResult<()> {
        // The GCS interoperability endpoint has no multi-object delete.
        for key in keys {
            debug!(bucket, key, "deleting object");

            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| self.error("Failed to delete object", bucket, key, err))?;
        }

        Ok(())
    }
}

impl fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("role", &self.role)
            .finish()
    }
}
