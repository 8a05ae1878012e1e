//! Small shared helpers.

use anyhow::Result;
use tokio::process::Command;
use url::Url;

/// Validate a source URL and return the normalized form.
pub fn validate_source_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|_| anyhow::anyhow!("Invalid URL format: {url}"))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Report missing external tools. Non-fatal: stages surface their own errors
/// when a tool is actually needed.
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for audio extraction".to_string());
    }

    if !check_command_available("ffprobe").await {
        missing.push("ffprobe - recommended for media metadata capture".to_string());
    }

    missing
}

async fn check_command_available(command: &str) -> bool {
    Command::new(command)
        .arg("-version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
