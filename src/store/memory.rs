use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{check_version, CallStore};
use crate::call::{CallId, CallRecord, CallStatus, GroupId};
use crate::error::StoreError;

/// Process-local store, used by tests and the `memory` backend
#[derive(Default)]
pub struct InMemoryCallStore {
    records: RwLock<HashMap<CallId, CallRecord>>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn insert(&self, record: CallRecord) -> Result<CallRecord, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.call_id) {
            return Err(StoreError::Duplicate(record.call_id));
        }
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
        records.insert(record.call_id, record.clone());
        Ok(record)
    }
}
