pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod recording;
pub mod segments;
pub mod service;
pub mod store;

pub use call::{
    CallId, CallKind, CallRecord, CallStatus, CaptureSource, ChunkId, DeviceSessionId, GroupId,
    MemberId, Participant, ParticipantRole, ParticipantStatus, RecordingState, RecordingStatus,
    Segment,
};
pub use client::{
    CallChange, CallSource, FallbackOutcome, FallbackRecorder, LocalCallSink, LocalCallView,
    LocalCaptureDevice, ReconciliationPoller,
};
pub use config::Config;
pub use error::{CallError, CallResult, ErrorKind, StoreError};
pub use events::{CallEventPublisher, NatsEventPublisher, NoopEventPublisher};
pub use http::{create_router, AppState};
pub use lifecycle::{CallController, ExpirySweeper, LeaveOutcome, RespondAction};
pub use recording::{
    CallLocks, CaptureMode, CaptureSession, ChannelTransport, MediaTransport, RawCapture,
    RecordingManager, StaticGroupPolicy,
};
pub use segments::{LocalSegmentStorage, SegmentUploader, WavTranscoder};
pub use service::CallService;
pub use store::{CallStore, FileCallStore, InMemoryCallStore};
