//! Longshore - a two-stage media acquisition pipeline
//!
//! This library resolves a source URL through a third-party extraction
//! service, persists the resulting video to object storage, and derives an
//! audio-only artifact by remuxing the stored video. Storage keys are
//! deterministic, so the object store doubles as the idempotency ledger:
//! repeated runs with identical inputs reuse the stored object instead of
//! downloading it again.

pub mod cli;
pub mod config;
pub mod extractor;
pub mod flow;
pub mod pipeline;
pub mod probe;
pub mod report;
pub mod storage;
pub mod transcode;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::{BucketSettings, ExtractorSettings, FileSettingsStore, SettingsStore};
pub use extractor::{ExtractionClient, MediaResolver};
pub use flow::{PipelineCoordinator, PipelineRunSummary, StageRunner};
pub use pipeline::{AudioExtractionStage, AudioRequest, DownloadRequest, DownloadStage};
pub use probe::{MediaMetadata, MediaProbe};
pub use storage::{ObjectStore, S3ObjectStore};
pub use transcode::{FfmpegTranscoder, Transcoder};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Classified pipeline failures. Transport and storage errors are not listed
/// here; they propagate unchanged so the scheduler can apply its own retry
/// policy.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The extraction service answered, but not with a usable download URL.
    /// Retrying cannot help; the picker case needs a human to pick a variant.
    #[error("extraction service error: {0}")]
    ServiceProtocol(String),

    /// A required external tool binary could not be launched at all.
    #[error("{tool} binary not found in PATH")]
    ToolMissing { tool: &'static str },

    /// The transcode tool ran but failed or produced no usable output.
    #[error("audio extraction failed: {0}")]
    AudioExtraction(String),
}
