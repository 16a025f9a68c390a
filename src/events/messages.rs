use serde::{Deserialize, Serialize};

use crate::call::{CallId, CallRecord, CallStatus, GroupId, RecordingStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEventKind {
    Created,
    Status,
    Recording,
    Segment,
}

/// Call event published on `calls.<groupId>.<callId>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEventMessage {
    pub event: CallEventKind,
    pub call_id: CallId,
    pub group_id: GroupId,
    pub status: CallStatus,
    pub recording_status: RecordingStatus,
    pub segment_count: usize,
    pub version: u64,
    pub timestamp: String, // RFC3339 timestamp
}

impl CallEventMessage {
    pub fn from_record(event: CallEventKind, record: &CallRecord) -> Self {
        Self {
            event,
            call_id: record.call_id,
            group_id: record.group_id.clone(),
            status: record.status,
            recording_status: record.recording.status,
            segment_count: record.recording.segments.len(),
            version: record.version,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn subject(&self) -> String {
        format!("calls.{}.{}", self.group_id, self.call_id)
    }
}
