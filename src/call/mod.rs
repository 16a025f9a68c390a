//! Call record data model
//!
//! A `CallRecord` is mutated only through the lifecycle controller and the
//! recording manager. Devices read it, never write it.

mod ids;
mod record;
mod recording;

pub use ids::{CallId, ChunkId, DeviceSessionId, GroupId, MemberId};
pub use record::{
    CallKind, CallRecord, CallStatus, Participant, ParticipantRole, ParticipantStatus,
};
pub use recording::{CaptureSource, RecordingState, RecordingStatus, Segment};
