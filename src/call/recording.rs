use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ChunkId, DeviceSessionId, MemberId};

/// Recording status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Stopping,
    Processing,
    Completed,
    Error,
    Disabled,
}

impl RecordingStatus {
    /// Segments may only be appended while a session is live or flushing
    pub fn accepts_segments(self) -> bool {
        matches!(
            self,
            RecordingStatus::Recording | RecordingStatus::Stopping | RecordingStatus::Processing
        )
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordingStatus::Idle => "idle",
            RecordingStatus::Recording => "recording",
            RecordingStatus::Stopping => "stopping",
            RecordingStatus::Processing => "processing",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Error => "error",
            RecordingStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Where the media of the current recording is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Server-side ghost recorder attached to the media transport
    Server,
    /// Owner device captures locally and uploads segments
    Client,
}

/// One contiguous, immutable piece of a call's recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    pub file_url: String,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingState {
    pub status: RecordingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_device_session_id: Option<DeviceSessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CaptureSource>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_by: Option<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_at: Option<DateTime<Utc>>,
}

impl RecordingState {
    pub fn new(enabled: bool) -> Self {
        Self {
            status: if enabled {
                RecordingStatus::Idle
            } else {
                RecordingStatus::Disabled
            },
            owner_device_session_id: None,
            source: None,
            segments: Vec::new(),
            is_hidden: false,
            hidden_by: None,
            hidden_at: None,
        }
    }

    pub fn is_owned_by(&self, session: &DeviceSessionId) -> bool {
        self.owner_device_session_id.as_ref() == Some(session)
    }

    /// Index the next appended segment receives
    pub fn next_chunk_index(&self) -> u32 {
        self.segments.len() as u32
    }

    /// Append a segment at the next index. Persisted segments are never
    /// rewritten.
    pub fn push_segment(&mut self, mut segment: Segment) -> Segment {
        segment.chunk_index = self.next_chunk_index();
        self.segments.push(segment.clone());
        segment
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::new(true)
    }
}
