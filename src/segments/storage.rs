use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use super::transcode::NormalizedFile;
use crate::call::{CallId, ChunkId};

/// Durable home of segment files
#[async_trait::async_trait]
pub trait SegmentStorage: Send + Sync {
    /// Store a normalised file and return the URL it is served from
    async fn persist(&self, call_id: &CallId, chunk_id: &ChunkId, file: &NormalizedFile)
        -> Result<String>;

    /// Remove a persisted file that never made it into a call record
    async fn discard(&self, file_url: &str) -> Result<()>;
}

/// Stores segments under `<root>/<callId>/<chunkId>.<ext>`, served below
/// `url_prefix`
#[derive(Debug, Clone)]
pub struct LocalSegmentStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalSegmentStorage {
    pub fn new(root: PathBuf, url_prefix: impl Into<String>) -> Self {
        Self {
            root,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for_url(&self, file_url: &str) -> Option<PathBuf> {
        let relative = file_url.strip_prefix(&self.url_prefix)?.trim_start_matches('/');
        if relative.split('/').any(|part| part == "..") {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl SegmentStorage for LocalSegmentStorage {
    async fn persist(
        &self,
        call_id: &CallId,
        chunk_id: &ChunkId,
        file: &NormalizedFile,
    ) -> Result<String> {
        let dir = self.root.join(call_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create segment directory: {:?}", dir))?;

        let name = format!("{}.{}", chunk_id, file.extension);
        let dest = dir.join(&name);
        tokio::fs::copy(&file.path, &dest)
            .await
            .with_context(|| format!("Failed to store segment {:?}", dest))?;

        debug!("Stored segment {:?}", dest);
        Ok(format!("{}/{}/{}", self.url_prefix, call_id, name))
    }

    async fn discard(&self, file_url: &str) -> Result<()> {
        let path = self
            .path_for_url(file_url)
            .with_context(|| format!("Not a local segment URL: {}", file_url))?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to remove segment {:?}", path))?;
        Ok(())
    }
}
