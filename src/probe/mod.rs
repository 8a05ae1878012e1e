//! Best-effort media metadata capture.
//!
//! Probing is strictly telemetry: a missing file, a missing ffprobe binary, a
//! failing run, or unparseable output all yield empty metadata, never an
//! error.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;

/// Technical metadata for a media asset. Absent fields are omitted from
/// summaries rather than defaulted to sentinel values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaMetadata {
    pub duration_seconds: Option<String>,
    pub size_bytes: Option<String>,
    pub bitrate: Option<String>,
    pub codec: Option<String>,
    pub resolution: Option<String>,
    pub frame_rate: Option<String>,
    pub video_bitrate: Option<String>,
}

impl MediaMetadata {
    pub fn is_empty(&self) -> bool {
        self.duration_seconds.is_none()
            && self.size_bytes.is_none()
            && self.bitrate.is_none()
            && self.codec.is_none()
            && self.resolution.is_none()
            && self.frame_rate.is_none()
            && self.video_bitrate.is_none()
    }

    /// Present fields as display rows, in a stable order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let fields = [
            ("Duration Seconds", &self.duration_seconds),
            ("Size Bytes", &self.size_bytes),
            ("Bitrate", &self.bitrate),
            ("Codec", &self.codec),
            ("Resolution", &self.resolution),
            ("Frame Rate", &self.frame_rate),
            ("Video Bitrate", &self.video_bitrate),
        ];

        fields
            .into_iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| (label, v.clone())))
            .collect()
    }
}

/// Invokes ffprobe against the first video stream and the container format.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe_path: String,
}

impl MediaProbe {
    pub fn new() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    /// Use a nonstandard ffprobe binary.
    pub fn with_tool_path(path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: path.into(),
        }
    }

    /// Probe `path` for duration, size, bitrate, codec, resolution, and
    /// frame rate. Returns empty metadata on any failure.
    pub async fn probe(&self, path: &Path) -> MediaMetadata {
        if !path.exists() {
            return MediaMetadata::default();
        }

        let output = match Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,codec_name,avg_frame_rate,bit_rate",
                "-show_entries",
                "format=duration,size,bit_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::debug!(
                    "ffprobe exited with {} for '{}': {}",
                    output.status,
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return MediaMetadata::default();
            }
            Err(err) => {
                tracing::debug!("ffprobe unavailable: {err}");
                return MediaMetadata::default();
            }
        };

        let data: Value = match serde_json::from_slice(&output.stdout) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!("unparseable ffprobe output for '{}': {err}", path.display());
                return MediaMetadata::default();
            }
        };

        let mut metadata = MediaMetadata::default();

        let format = &data["format"];
        metadata.duration_seconds = value_as_string(&format["duration"]);
        metadata.size_bytes = value_as_string(&format["size"]);
        metadata.bitrate = value_as_string(&format["bit_rate"]);

        if let Some(stream) = data["streams"].as_array().and_then(|streams| streams.first()) {
            metadata.codec = value_as_string(&stream["codec_name"]);
            if let (Some(width), Some(height)) = (stream["width"].as_i64(), stream["height"].as_i64())
            {
                metadata.resolution = Some(format!("{width}x{height}"));
            }
            // "0/0" means the tool could not determine a rate; treat as unknown.
            metadata.frame_rate =
                value_as_string(&stream["avg_frame_rate"]).filter(|rate| rate != "0/0");
            metadata.video_bitrate = value_as_string(&stream["bit_rate"]);
        }

        metadata
    }
}

impl Default for MediaProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn missing_file_yields_empty_metadata() {
        let probe = MediaProbe::new();
        let metadata = probe.probe(Path::new("/nonexistent/video.mp4")).await;
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn missing_tool_yields_empty_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs_err::write(&path, b"not a real video").unwrap();

        let probe = MediaProbe::with_tool_path("/nonexistent/ffprobe-missing");
        let metadata = probe.probe(&path).await;
        assert!(metadata.is_empty());
    }

    #[test]
    fn rows_skip_absent_fields() {
        let metadata = MediaMetadata {
            codec: Some("h264".to_string()),
            resolution: Some("1920x1080".to_string()),
            ..Default::default()
        };
        let rows = metadata.rows();
        assert_eq!(
            rows,
            vec![
                ("Codec", "h264".to_string()),
                ("Resolution", "1920x1080".to_string()),
            ]
        );
    }
}
