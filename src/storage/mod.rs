//! Object storage access behind a narrow trait.
//!
//! The stages only consume head/exists/upload/download/read; everything else
//! about the store is a deployment detail. A recognized "not found" from the
//! service is a legitimate negative existence result, not an error.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::config::BucketSettings;

#[cfg(test)]
pub mod memory;

/// HEAD metadata for a stored object.
#[derive(Debug, Clone, Default)]
pub struct ObjectHead {
    pub content_length: Option<i64>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Narrow view of the object store consumed by the pipeline stages.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// HEAD the object, or `None` when the store reports it absent.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>>;

    /// Upload a local file; returns the resolved storage path.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String>;

    /// Download the object to a local file.
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Read the object into memory.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// `true` when an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// Fully-qualified URI for operator-facing summaries.
    fn storage_uri(&self, key: &str) -> String;

    /// Browsable endpoint for the store, when one is configured.
    fn endpoint_url(&self) -> Option<&str> {
        None
    }
}

/// S3-compatible adapter. Endpoint and path-style overrides make it work
/// against MinIO-style deployments as well as AWS.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    endpoint_url: Option<String>,
}

impl S3ObjectStore {
    pub async fn connect(settings: &BucketSettings) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = S3Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: settings.bucket.clone(),
            endpoint_url: settings.endpoint_url.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectHead {
                content_length: output.content_length(),
                etag: output.e_tag().map(str::to_string),
                last_modified: output
                    .last_modified()
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())),
            })),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(HeadObjectError::is_not_found)
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(anyhow::Error::from(err))
                        .with_context(|| format!("failed to HEAD object '{key}'"))
                }
            }
        }
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("failed to open '{}' for upload", local_path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to upload object '{key}'"))?;

        Ok(key.to_string())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch object '{key}'"))?;

        let mut file = tokio::fs::File::create(local_path)
            .await
            .with_context(|| format!("failed to create '{}'", local_path.display()))?;
        while let Some(chunk) = object.body.try_next().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch object '{key}'"))?;

        let data = object
            .body
            .collect()
            .await
            .with_context(|| format!("failed to read object '{key}'"))?;

        Ok(data.into_bytes().to_vec())
    }

    fn storage_uri(&self, key: &str) -> String {
        format!("s3://{}/{key}", self.bucket)
    }

    fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }
}
