use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::storage::SegmentStorage;
use super::transcode::Transcoder;
use crate::call::{CallId, ChunkId, Segment};
use crate::error::{CallError, CallResult};
use crate::recording::{CallGuard, CallLocks, RawCapture};
use crate::store::{self, CallStore};

/// Persists finished captures and appends them to the call's segment list
///
/// `chunkIndex` is assigned at commit time from the record being written,
/// guarded by the store version check, so two appends can never share an
/// index.
pub struct SegmentUploader {
    store: Arc<dyn CallStore>,
    transcoder: Arc<dyn Transcoder>,
    storage: Arc<dyn SegmentStorage>,
    locks: Arc<CallLocks>,
}

impl SegmentUploader {
    pub fn new(
        store: Arc<dyn CallStore>,
        transcoder: Arc<dyn Transcoder>,
        storage: Arc<dyn SegmentStorage>,
        locks: Arc<CallLocks>,
    ) -> Self {
        Self {
            store,
            transcoder,
            storage,
            locks,
        }
    }

    /// Append a segment, taking the call's lock
    pub async fn append_segment(&self, call_id: &CallId, raw: RawCapture) -> CallResult<Segment> {
        let guard = self.locks.lock(*call_id).await;
        let result = self.append_locked(&guard, raw).await;
        let call_over = store::is_over(&*self.store, call_id).await;
        self.locks.unlock(guard, call_over).await;
        result
    }

    /// Append a segment while the caller already holds the call's lock
    pub async fn append_locked(&self, guard: &CallGuard, raw: RawCapture) -> CallResult<Segment> {
        let call_id = *guard.call_id();
        let segment = match self.normalize_and_commit(&call_id, &raw).await {
            Ok((segment, normalized)) => {
                self.cleanup_staging(&raw, &normalized).await;
                segment
            }
            Err(e) => {
                warn!(
                    "Call {} segment not appended, capture kept at {:?}: {}",
                    call_id, raw.path, e
                );
                return Err(e);
            }
        };

        info!(
            "Call {} segment {} appended ({} ms)",
            call_id, segment.chunk_index, segment.duration_ms
        );
        Ok(segment)
    }

    async fn normalize_and_commit(
        &self,
        call_id: &CallId,
        raw: &RawCapture,
    ) -> CallResult<(Segment, PathBuf)> {
        let record = store::load(&*self.store, call_id).await?;
        if !record.recording.status.accepts_segments() {
            return Err(CallError::NotRecording(*call_id));
        }

        let normalized = self
            .transcoder
            .convert(raw)
            .await
            .map_err(|e| CallError::Upload(format!("{:#}", e)))?;

        let chunk_id = ChunkId::new();
        let file_url = self
            .storage
            .persist(call_id, &chunk_id, &normalized)
            .await
            .map_err(|e| CallError::Upload(format!("{:#}", e)))?;

        let committed = store::mutate(&*self.store, call_id, |rec| {
            if !rec.recording.status.accepts_segments() {
                return Err(CallError::NotRecording(*call_id));
            }
            rec.recording.push_segment(Segment {
                chunk_id,
                chunk_index: 0,
                file_url: file_url.clone(),
                duration_ms: raw.duration_ms,
                started_at: raw.started_at,
            });
            Ok(true)
        })
        .await;

        let record = match committed {
            Ok(record) => record,
            Err(e) => {
                if let Err(discard) = self.storage.discard(&file_url).await {
                    warn!("Failed to discard orphan segment {}: {:#}", file_url, discard);
                }
                return Err(e);
            }
        };

        let segment = record
            .recording
            .segments
            .iter()
            .find(|s| s.chunk_id == chunk_id)
            .cloned()
            .ok_or_else(|| CallError::Upload(format!("segment {} missing after commit", chunk_id)))?;

        Ok((segment, normalized.path))
    }

    /// Remove staging files once the segment is stored
    async fn cleanup_staging(&self, raw: &RawCapture, normalized: &Path) {
        let mut paths: HashSet<&Path> = HashSet::new();
        paths.insert(raw.path.as_path());
        paths.insert(normalized);

        for path in paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove staging file {:?}: {}", path, e);
                }
            }
        }
    }
}
