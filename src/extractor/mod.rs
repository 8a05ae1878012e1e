//! Client for the media extraction service.
//!
//! The service resolves a source URL to a directly downloadable media URL.
//! It answers with a status-tagged JSON payload; only `tunnel` and `redirect`
//! carry a usable download URL. `picker` means multiple media variants exist
//! and a human has to choose, so it is rejected outright rather than retried.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::ExtractorSettings;
use crate::PipelineError;

/// Request payload sent to the extraction service.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest<'a> {
    pub url: &'a str,
}

/// Raw response payload from the extraction service. Unknown statuses are
/// kept verbatim so failures can name them.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResponse {
    pub status: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ExtractionResponse {
    /// Classify the response, yielding the download URL for success statuses.
    pub fn into_download_url(self) -> Result<String, PipelineError> {
        match self.status.as_str() {
            "tunnel" | "redirect" => self.url.filter(|url| !url.is_empty()).ok_or_else(|| {
                PipelineError::ServiceProtocol("response missing download URL".to_string())
            }),
            "picker" => Err(PipelineError::ServiceProtocol(
                "service requires user selection of a media variant; cannot download automatically"
                    .to_string(),
            )),
            other => Err(PipelineError::ServiceProtocol(
                self.error
                    .unwrap_or_else(|| format!("unexpected service status '{other}'")),
            )),
        }
    }
}

/// Resolves source URLs and fetches the resulting assets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Ask the extraction service for a directly downloadable URL.
    async fn resolve(&self, source_url: &str) -> Result<String>;

    /// Stream the asset at `download_url` into `dest`.
    async fn fetch(&self, download_url: &str, dest: &Path) -> Result<()>;
}

/// reqwest-backed resolver. Keeps two clients: metadata requests get the
/// short timeout, bulk transfers get the long one.
pub struct ExtractionClient {
    settings: ExtractorSettings,
    api_client: reqwest::Client,
    transfer_client: reqwest::Client,
}

impl ExtractionClient {
    pub fn new(settings: ExtractorSettings) -> Result<Self> {
        let api_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .context("failed to build extraction api client")?;
        let transfer_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.download_timeout_seconds))
            .build()
            .context("failed to build transfer client")?;

        Ok(Self {
            settings,
            api_client,
            transfer_client,
        })
    }
}

#[async_trait]
impl MediaResolver for ExtractionClient {
    async fn resolve(&self, source_url: &str) -> Result<String> {
        tracing::debug!("resolving '{source_url}' via {}", self.settings.base_url);

        let response = self
            .api_client
            .post(&self.settings.base_url)
            .headers(self.settings.headers())
            .json(&ExtractionRequest { url: source_url })
            .send()
            .await?
            .error_for_status()?;

        let payload: ExtractionResponse = response
            .json()
            .await
            .context("extraction service returned an unparseable response")?;

        Ok(payload.into_download_url()?)
    }

    async fn fetch(&self, download_url: &str, dest: &Path) -> Result<()> {
        let response = self
            .transfer_client
            .get(download_url)
            .send()
            .await?
            .error_for_status()?;

        let progress = ProgressBar::new(response.content_length().unwrap_or(0));
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap(),
        );
        progress.set_message("Downloading media...");

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("failed to create '{}'", dest.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            progress.inc(chunk.len() as u64);
        }
        file.flush().await?;
        progress.finish_with_message("Download complete");

        Ok(())
    }
}
