//! Audio extraction stage: remux the stored video's audio track into a
//! Matroska audio container.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::report::{ArtifactSummary, ReportSink};
use crate::storage::ObjectStore;
use crate::transcode::Transcoder;
use crate::PipelineError;

use super::keys::derive_audio_key;

/// One audio-extraction invocation.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    /// Storage key of the source video object.
    pub source_object_path: String,

    /// Identifier namespacing the output artifact.
    pub task_id: String,

    /// Optional override for the audio filename within the task namespace.
    pub object_name: Option<String>,
}

/// Derives an audio-only artifact from a stored video. The remux copies the
/// first audio stream without re-encoding, so the audio characteristics stay
/// identical to the source.
pub struct AudioExtractionStage {
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    reporter: Arc<dyn ReportSink>,
    path_prefix: Option<String>,
    scratch_dir: Option<PathBuf>,
}

impl AudioExtractionStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        reporter: Arc<dyn ReportSink>,
        path_prefix: Option<String>,
    ) -> Self {
        Self {
            store,
            transcoder,
            reporter,
            path_prefix,
            scratch_dir: None,
        }
    }

    /// Place per-invocation scratch directories under `dir`.
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    /// Run the full extraction protocol; returns the resolved storage path
    /// of the audio artifact. Scratch space is released on every exit path.
    pub async fn run(&self, request: &AudioRequest) -> Result<String> {
        let (_, storage_key) = derive_audio_key(
            &request.source_object_path,
            &request.task_id,
            self.path_prefix.as_deref(),
            request.object_name.as_deref(),
        );

        let scratch = self.make_scratch()?;
        let source_path = scratch
            .path()
            .join(file_name_of(&request.source_object_path));
        let audio_path = scratch.path().join(file_name_of(&storage_key));

        tracing::info!("downloading source video '{}'", request.source_object_path);
        self.store
            .download(&request.source_object_path, &source_path)
            .await?;

        self.transcoder.remux_audio(&source_path, &audio_path).await?;

        let produced = fs_err::metadata(&audio_path)
            .map(|meta| meta.len())
            .unwrap_or(0);
        if produced == 0 {
            return Err(PipelineError::AudioExtraction(
                "transcode tool did not produce an audio artifact".to_string(),
            )
            .into());
        }

        tracing::info!("uploading audio artifact to '{storage_key}'");
        let storage_path = self.store.upload(&audio_path, &storage_key).await?;

        let head = self.store.head(&storage_key).await?.unwrap_or_default();
        let mut summary =
            ArtifactSummary::new(format!("audio-{}", request.task_id), "Audio Extraction");
        summary.push("Task ID", &request.task_id);
        summary.push("Source Object", &request.source_object_path);
        summary.push("Audio Object", &storage_path);
        summary.push_head(&head, "Audio Size");
        self.reporter.publish(&summary).await;

        tracing::info!("audio extraction succeeded; stored object: {storage_path}");
        Ok(storage_path)
    }

    fn make_scratch(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("audio-extract-");
        match &self.scratch_dir {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .context("failed to create scratch directory")
    }
}

fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
