//! Call Record Store
//!
//! The single source of truth for call records. Writers use optimistic
//! concurrency: every record carries a `version` and `replace` only
//! succeeds against the version that was read.

mod file;
mod memory;

pub use file::FileCallStore;
pub use memory::InMemoryCallStore;

use async_trait::async_trait;
use tracing::debug;

use crate::call::{CallId, CallRecord, CallStatus, GroupId};
use crate::error::{CallError, CallResult, StoreError};

/// Read-modify-write attempts before a version conflict is surfaced
const MAX_WRITE_ATTEMPTS: usize = 8;

#[async_trait]
pub trait CallStore: Send + Sync {
    /// Insert a freshly created record
    async fn insert(&self, record: CallRecord) -> Result<CallRecord, StoreError>;

    async fn get(&self, call_id: &CallId) -> Result<Option<CallRecord>, StoreError>;

    /// All calls of a group, oldest first
    async fn list_group(&self, group_id: &GroupId) -> Result<Vec<CallRecord>, StoreError>;

    async fn list_by_status(&self, status: CallStatus) -> Result<Vec<CallRecord>, StoreError>;

    /// Replace a record if its stored version still equals `expected_version`.
    /// Returns the saved record with its version bumped.
    async fn replace(
        &self,
        record: CallRecord,
        expected_version: u64,
    ) -> Result<CallRecord, StoreError>;
}

/// Fetch a record or fail with `CallNotFound`
pub async fn load(store: &dyn CallStore, call_id: &CallId) -> CallResult<CallRecord> {
    store
        .get(call_id)
        .await?
        .ok_or(CallError::CallNotFound(*call_id))
}

/// Whether a call is terminal or gone. Read errors count as live.
pub async fn is_over(store: &dyn CallStore, call_id: &CallId) -> bool {
    match store.get(call_id).await {
        Ok(Some(record)) => record.status.is_terminal(),
        Ok(None) => true,
        Err(_) => false,
    }
}

/// Apply `apply` to the current record and write it back, retrying on
/// version conflicts.
///
/// `apply` returns whether it changed the record; unchanged records are not
/// written. It may run more than once and must be free of side effects
/// outside the record.
pub async fn mutate<F>(store: &dyn CallStore, call_id: &CallId, mut apply: F) -> CallResult<CallRecord>
where
    F: FnMut(&mut CallRecord) -> CallResult<bool> + Send,
{
    let mut last_conflict = None;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut record = load(store, call_id).await?;
        let expected = record.version;

        if !apply(&mut record)? {
            return Ok(record);
        }

        match store.replace(record, expected).await {
            Ok(saved) => return Ok(saved),
            Err(conflict @ StoreError::VersionConflict { .. }) => {
                debug!("Call {} write conflict (attempt {})", call_id, attempt);
                last_conflict = Some(conflict);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(last_conflict
        .unwrap_or(StoreError::NotFound(*call_id))
        .into())
}

/// Bump the version and check the expected one; shared by the backends
pub(crate) fn check_version(
    current: &CallRecord,
    record: &mut CallRecord,
    expected_version: u64,
) -> Result<(), StoreError> {
    if current.version != expected_version {
        return Err(StoreError::VersionConflict {
            call_id: current.call_id,
            expected: expected_version,
            found: current.version,
        });
    }
    record.version = expected_version + 1;
    Ok(())
}
