//! Download stage: resolve a source URL and persist the asset exactly once
//! per storage key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::extractor::MediaResolver;
use crate::probe::{MediaMetadata, MediaProbe};
use crate::report::{storage_link, ArtifactSummary, ReportSink};
use crate::storage::{ObjectHead, ObjectStore};

use super::keys::derive_download_key;

/// One download invocation.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Original media URL to resolve via the extraction service.
    pub source_url: String,

    /// Identifier namespacing the uploaded object path. Concurrent runs with
    /// the same task_id and object name converge on the same key, which is
    /// the intended idempotency behavior.
    pub task_id: String,

    /// Optional object key for the uploaded asset; defaults to a
    /// task-id-based filename.
    pub object_name: Option<String>,
}

/// Resolves a source URL through the extraction service and persists the
/// asset to object storage.
///
/// The store itself is the idempotency ledger: when an object already exists
/// at the derived key the stage reuses it instead of downloading again. No
/// side-table is kept.
pub struct DownloadStage {
    resolver: Arc<dyn MediaResolver>,
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn ReportSink>,
    probe: MediaProbe,
    path_prefix: Option<String>,
    scratch_dir: Option<PathBuf>,
}

impl DownloadStage {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        store: Arc<dyn ObjectStore>,
        reporter: Arc<dyn ReportSink>,
        path_prefix: Option<String>,
    ) -> Self {
        Self {
            resolver,
            store,
            reporter,
            probe: MediaProbe::new(),
            path_prefix,
            scratch_dir: None,
        }
    }

    /// Use a nonstandard probe (tests, unusual installs).
    pub fn with_probe(mut self, probe: MediaProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Place per-invocation scratch directories under `dir`.
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    /// Run the full download protocol; returns the resolved storage path.
    pub async fn run(&self, request: &DownloadRequest) -> Result<String> {
        let download_url = self.resolver.resolve(&request.source_url).await?;

        let file_name = request
            .object_name
            .clone()
            .unwrap_or_else(|| format!("video_{}.mp4", request.task_id));
        let storage_key =
            derive_download_key(&request.task_id, self.path_prefix.as_deref(), &file_name);

        // The existence check strictly precedes any download decision.
        if let Some(head) = self.store.head(&storage_key).await? {
            tracing::info!("object '{storage_key}' already stored; skipping download");
            let metadata = self.gather_media_metadata(&storage_key, None).await;
            self.emit_summary(request, &storage_key, &head, &metadata, true)
                .await;
            return Ok(storage_key);
        }

        let scratch = self.make_scratch("media-download-")?;
        let local_path = scratch.path().join(&file_name);

        tracing::info!("fetching '{download_url}' to '{}'", local_path.display());
        self.resolver.fetch(&download_url, &local_path).await?;

        let storage_path = self.store.upload(&local_path, &storage_key).await?;

        let head = self.store.head(&storage_key).await?.unwrap_or_default();
        let metadata = self
            .gather_media_metadata(&storage_key, Some(&local_path))
            .await;
        self.emit_summary(request, &storage_path, &head, &metadata, false)
            .await;

        // Scratch removal is best-effort and must not mask the stored result.
        let _ = scratch.close();

        Ok(storage_path)
    }

    /// Probe media metadata, fetching a temporary copy when no local file is
    /// at hand. Probing is telemetry only and never fails the stage.
    async fn gather_media_metadata(&self, key: &str, local_path: Option<&Path>) -> MediaMetadata {
        if let Some(path) = local_path {
            return self.probe.probe(path).await;
        }

        let scratch = match self.make_scratch("head-probe-") {
            Ok(dir) => dir,
            Err(err) => {
                tracing::debug!("skipping probe for '{key}': {err:#}");
                return MediaMetadata::default();
            }
        };
        let file_name = key.rsplit('/').next().unwrap_or(key);
        let copy_path = scratch.path().join(file_name);

        let bytes = match self.store.read(key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!("skipping probe for '{key}': {err:#}");
                return MediaMetadata::default();
            }
        };
        if let Err(err) = fs_err::write(&copy_path, bytes) {
            tracing::debug!("skipping probe for '{key}': {err}");
            return MediaMetadata::default();
        }

        let metadata = self.probe.probe(&copy_path).await;
        let _ = scratch.close();
        metadata
    }

    async fn emit_summary(
        &self,
        request: &DownloadRequest,
        storage_path: &str,
        head: &ObjectHead,
        metadata: &MediaMetadata,
        reused: bool,
    ) {
        let uri = self.store.storage_uri(storage_path);
        let mut summary =
            ArtifactSummary::new(format!("download-{}", request.task_id), "Media Download");
        summary.push(
            "Status",
            if reused {
                "Reused existing object"
            } else {
                "Uploaded new object"
            },
        );
        summary.push("Storage URI", storage_link(&uri, self.store.endpoint_url()));
        summary.push("Task ID", &request.task_id);
        summary.push("Source URL", &request.source_url);
        summary.push_head(head, "Object Size");
        summary.push_metadata(metadata);
        self.reporter.publish(&summary).await;
    }

    fn make_scratch(&self, prefix: &str) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.scratch_dir {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .context("failed to create scratch directory")
    }
}
