use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::config::AppConfig;

/// Object-store seam for contract attachments. Tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    /// Builds the bucket client from the environment-driven settings.
    /// Explicit credentials and a custom endpoint cover MinIO-style
    /// deployments; without them the SDK's default chain applies.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let region_provider =
            RegionProviderChain::first_try(Region::new(config.aws_region.clone()))
                .or_default_provider();

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);
        if let Some(endpoint) = config.aws_endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (
            config.aws_access_key_id.as_deref(),
            config.aws_secret_access_key.as_deref(),
        ) {
            loader =
                loader.credentials_provider(Credentials::new(key_id, secret, None, None, "static"));
        }

        let shared = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&shared).force_path_style(true).build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.s3_bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn store(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type)
            .set_content_disposition(content_disposition)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("failed to store object {key}"))?;
        Ok(())
    }

    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning =
            PresigningConfig::expires_in(expires_in).context("invalid presign expiry")?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("failed to presign download for {key}"))?;

        Ok(request.uri().to_string())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete object {key}"))?;
        Ok(())
    }
}
