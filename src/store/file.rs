use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{check_version, CallStore};
use crate::call::{CallId, CallRecord, CallStatus, GroupId};
use crate::error::StoreError;

/// Durable store keeping one JSON document per call
///
/// Records are cached in memory and written through on every change. Writes
/// go to a temporary file that is renamed over the previous document.
pub struct FileCallStore {
    dir: PathBuf,
    records: RwLock<HashMap<CallId, CallRecord>>,
}

impl FileCallStore {
    /// Open (or create) a store directory and load every record in it
    pub async fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create store directory: {:?}", dir))?;

        let mut records = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to read store directory: {:?}", dir))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<CallRecord>(&bytes) {
                Ok(record) => {
                    records.insert(record.call_id, record);
                }
                Err(e) => warn!("Skipping unreadable call record {:?}: {}", path, e),
            }
        }

        info!("Loaded {} call records from {:?}", records.len(), dir);

        Ok(Self {
            dir,
            records: RwLock::new(records),
        })
    }

    fn path_for(&self, call_id: &CallId) -> PathBuf {
        self.dir.join(format!("{}.json", call_id))
    }

    async fn write(&self, record: &CallRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.call_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl CallStore for FileCallStore {
    async fn insert(&self, record: CallRecord) -> Result<CallRecord, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.call_id) {
            return Err(StoreError::Duplicate(record.call_id));
        }
        self.write(&record).await?;
        records.insert(record.call_id, record.clone());
        Ok(record)
    }

    async fn get(&self, call_id: &CallId) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.records.read().await.get(call_id).cloned())
    }

    async fn list_group(&self, group_id: &GroupId) -> Result<Vec<CallRecord>, StoreError> {
        let records = self.records.read().await;
        let mut calls: Vec<CallRecord> = records
            .values()
            .filter(|r| &r.group_id == group_id)
            .cloned()
            .collect();
        calls.sort_by_key(|r| r.created_at);
        Ok(calls)
    }

    async fn list_by_status(&self, status: CallStatus) -> Result<Vec<CallRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn replace(
        &self,
        mut record: CallRecord,
        expected_version: u64,
    ) -> Result<CallRecord, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get(&record.call_id)
            .ok_or(StoreError::NotFound(record.call_id))?;
        check_version(current, &mut record, expected_version)?;
        self.write(&record).await?;
        records.insert(record.call_id, record.clone());
        Ok(record)
    }
}
