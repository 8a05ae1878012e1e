//! Lossless audio remux via ffmpeg.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::PipelineError;

/// Seam for the external transcode tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Repackage the first audio stream of `source` into `target` without
    /// re-encoding; the encoded audio data passes through byte-for-byte.
    async fn remux_audio(&self, source: &Path, target: &Path) -> Result<(), PipelineError>;
}

/// ffmpeg-backed transcoder.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    /// Use a nonstandard ffmpeg binary.
    pub fn with_tool_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn remux_audio(&self, source: &Path, target: &Path) -> Result<(), PipelineError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .arg("-y")
            .arg("-i")
            .arg(source)
            .args(["-map", "0:a:0", "-c:a", "copy"])
            .arg(target);

        tracing::info!("running ffmpeg remux: {:?}", command.as_std());

        let output = match command.output().await {
            Ok(output) => output,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::ToolMissing { tool: "ffmpeg" });
            }
            Err(err) => {
                return Err(PipelineError::AudioExtraction(format!(
                    "failed to launch ffmpeg: {err}"
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = stderr.trim();
            let diagnostic = if diagnostic.is_empty() {
                "Unknown error"
            } else {
                diagnostic
            };
            return Err(PipelineError::AudioExtraction(format!(
                "ffmpeg exited with {}: {diagnostic}",
                output.status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_a_distinct_failure() {
        let transcoder = FfmpegTranscoder::with_tool_path("/nonexistent/ffmpeg-missing");
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        let target = dir.path().join("out.mka");
        fs_err::write(&source, b"data").unwrap();

        let err = transcoder.remux_audio(&source, &target).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolMissing { tool: "ffmpeg" }));
    }
}
