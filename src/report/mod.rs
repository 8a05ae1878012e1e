//! Run summaries for operator visibility.
//!
//! Each stage emits one `ArtifactSummary` per invocation. Publishing is
//! fire-and-forget: the sink never influences control flow and never fails
//! the caller.

use async_trait::async_trait;

use crate::probe::MediaMetadata;
use crate::storage::ObjectHead;

/// Tabular stage summary, keyed for the reporting sink.
#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    pub key: String,
    pub title: String,
    rows: Vec<(String, String)>,
}

impl ArtifactSummary {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.rows.push((field.into(), value.into()));
    }

    /// Append the interesting HEAD fields, skipping absent ones.
    pub fn push_head(&mut self, head: &ObjectHead, size_label: &str) {
        if let Some(size) = head.content_length {
            self.push(size_label, format!("{size} bytes"));
        }
        if let Some(etag) = &head.etag {
            self.push("ETag", etag);
        }
        if let Some(modified) = &head.last_modified {
            self.push("Last Modified", modified.to_rfc3339());
        }
    }

    /// Append present probe fields.
    pub fn push_metadata(&mut self, metadata: &MediaMetadata) {
        for (field, value) in metadata.rows() {
            self.push(field, value);
        }
    }

    pub fn rows(&self) -> &[(String, String)] {
        &self.rows
    }

    /// Render the summary as a markdown table.
    pub fn to_markdown(&self) -> String {
        let body = self
            .rows
            .iter()
            .map(|(field, value)| format!("| {field} | {value} |"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("## {}\n| Field | Value |\n| --- | --- |\n{body}", self.title)
    }
}

/// Link the storage URI to a browsable endpoint when one is known.
pub fn storage_link(uri: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => {
            let object_path = uri.split_once("//").map(|(_, rest)| rest).unwrap_or(uri);
            format!("[{uri}]({}/{object_path})", endpoint.trim_end_matches('/'))
        }
        None => uri.to_string(),
    }
}

/// Side-channel sink for stage summaries.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Publish a summary. Must never fail the caller.
    async fn publish(&self, summary: &ArtifactSummary);
}

/// Sink that writes summaries to the log.
#[derive(Debug, Default, Clone)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn publish(&self, summary: &ArtifactSummary) {
        tracing::info!(key = %summary.key, "\n{}", summary.to_markdown());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_markdown_table() {
        let mut summary = ArtifactSummary::new("download-task-1", "Media Download");
        summary.push("Status", "Uploaded new object");
        summary.push("Task ID", "task-1");

        let markdown = summary.to_markdown();
        assert!(markdown.starts_with("## Media Download\n| Field | Value |\n| --- | --- |\n"));
        assert!(markdown.contains("| Status | Uploaded new object |"));
        assert!(markdown.contains("| Task ID | task-1 |"));
    }

    #[test]
    fn head_rows_skip_absent_fields() {
        let mut summary = ArtifactSummary::new("k", "t");
        summary.push_head(
            &ObjectHead {
                content_length: Some(5),
                etag: None,
                last_modified: None,
            },
            "Object Size",
        );
        assert_eq!(summary.rows(), &[("Object Size".to_string(), "5 bytes".to_string())]);
    }

    #[test]
    fn storage_link_uses_the_endpoint_when_known() {
        assert_eq!(
            storage_link("s3://assets/task-1/download/v.mp4", Some("http://storage.test:9000/")),
            "[s3://assets/task-1/download/v.mp4](http://storage.test:9000/assets/task-1/download/v.mp4)"
        );
        assert_eq!(
            storage_link("s3://assets/task-1/download/v.mp4", None),
            "s3://assets/task-1/download/v.mp4"
        );
    }
}
