//! In-memory object store used by pipeline tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{ObjectHead, ObjectStore};

/// Map-backed store that persists across calls within a test and counts
/// uploads, so tests can assert the idempotent short-circuit.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub async fn insert(&self, key: &str, bytes: &[u8]) {
        self.objects.lock().await.insert(key.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        Ok(self.objects.lock().await.get(key).map(|bytes| ObjectHead {
            content_length: Some(bytes.len() as i64),
            etag: Some(format!("\"len-{}\"", bytes.len())),
            last_modified: Some(Utc::now()),
        }))
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        let bytes = fs_err::read(local_path).context("reading upload source")?;
        self.objects.lock().await.insert(key.to_string(), bytes);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(key.to_string())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let bytes = self.read(key).await?;
        fs_err::write(local_path, bytes)?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .with_context(|| format!("object '{key}' not found"))
    }

    fn storage_uri(&self, key: &str) -> String {
        format!("s3://test-bucket/{key}")
    }
}
