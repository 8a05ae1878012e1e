//! Named settings profiles for the pipeline's collaborators.
//!
//! Profiles live in a single YAML file. `FileSettingsStore` is the concrete
//! provider chosen at startup; the stages only ever see the `SettingsStore`
//! trait, so a different adapter (env vars, remote config service) can be
//! swapped in without touching pipeline code.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// Access settings for the extraction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    /// Endpoint that accepts download requests.
    pub base_url: String,

    /// Timeout (in seconds) for the initial resolve request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Timeout (in seconds) for streaming the asset itself. Bulk transfer has
    /// to tolerate much longer waits than the metadata call.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    120
}

impl ExtractorSettings {
    /// Default headers for extraction requests.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// Target bucket details for the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSettings {
    pub bucket: String,

    /// S3-compatible endpoint override, for MinIO-style deployments.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Optional prefix prepended to object keys within the task namespace.
    #[serde(default)]
    pub path_prefix: Option<String>,
}

/// Application-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    /// Base directory for per-invocation scratch space.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

/// On-disk layout of the settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub extractors: HashMap<String, ExtractorSettings>,

    #[serde(default)]
    pub buckets: HashMap<String, BucketSettings>,

    #[serde(default)]
    pub app: AppSettings,
}

/// Provider interface for named settings profiles.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_extractor(&self, name: &str) -> Result<ExtractorSettings>;

    async fn load_bucket(&self, name: &str) -> Result<BucketSettings>;
}

/// File-backed settings provider.
pub struct FileSettingsStore {
    config: Config,
}

impl FileSettingsStore {
    /// Load the settings file, looking in the working directory first and the
    /// user config directory second.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let content = fs_err::read_to_string(&path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let config: Config = serde_yaml::from_str(&content).context("failed to parse settings file")?;
        Ok(Self { config })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn config_path() -> Result<PathBuf> {
        // Current directory first for easy local testing.
        let local = PathBuf::from("longshore.yaml");
        if local.exists() {
            return Ok(local);
        }

        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("longshore").join("config.yaml"))
    }

    /// Display the loaded profiles.
    pub fn display(&self) {
        println!("Extractor profiles:");
        for (name, extractor) in &self.config.extractors {
            println!(
                "  {name}: {} (request {}s, transfer {}s)",
                extractor.base_url,
                extractor.request_timeout_seconds,
                extractor.download_timeout_seconds
            );
        }
        println!("Bucket profiles:");
        for (name, bucket) in &self.config.buckets {
            let endpoint = bucket.endpoint_url.as_deref().unwrap_or("aws");
            let prefix = bucket.path_prefix.as_deref().unwrap_or("-");
            println!("  {name}: {} ({endpoint}, prefix {prefix})", bucket.bucket);
        }
        if let Some(dir) = &self.config.app.scratch_dir {
            println!("Scratch dir: {}", dir.display());
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load_extractor(&self, name: &str) -> Result<ExtractorSettings> {
        self.config
            .extractors
            .get(name)
            .cloned()
            .with_context(|| format!("no extractor settings named '{name}'"))
    }

    async fn load_bucket(&self, name: &str) -> Result<BucketSettings> {
        self.config
            .buckets
            .get(name)
            .cloned()
            .with_context(|| format!("no bucket settings named '{name}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
extractors:
  default:
    base_url: "http://extractor.internal/api/download"
buckets:
  default:
    bucket: "media-assets"
    endpoint_url: "http://storage.internal:9000"
    path_prefix: "videos"
"#;

    #[tokio::test]
    async fn loads_named_profiles_with_defaults() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        let store = FileSettingsStore::from_config(config);

        let extractor = store.load_extractor("default").await.unwrap();
        assert_eq!(extractor.base_url, "http://extractor.internal/api/download");
        assert_eq!(extractor.request_timeout_seconds, 30);
        assert_eq!(extractor.download_timeout_seconds, 120);

        let bucket = store.load_bucket("default").await.unwrap();
        assert_eq!(bucket.bucket, "media-assets");
        assert_eq!(bucket.path_prefix.as_deref(), Some("videos"));
    }

    #[tokio::test]
    async fn unknown_profile_is_an_error() {
        let store = FileSettingsStore::from_config(Config::default());
        assert!(store.load_extractor("missing").await.is_err());
        assert!(store.load_bucket("missing").await.is_err());
    }

    #[test]
    fn headers_advertise_json() {
        let settings = ExtractorSettings {
            base_url: "http://extractor.test".to_string(),
            request_timeout_seconds: 5,
            download_timeout_seconds: 5,
        };
        let headers = settings.headers();
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }
}
