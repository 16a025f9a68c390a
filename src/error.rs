//! Error taxonomy for call and recording operations
//!
//! Authorization errors are always surfaced. State conflicts are surfaced
//! unless the operation is naturally idempotent. Capture and upload errors
//! are recovered locally and never end a call.

use thiserror::Error;

use crate::call::{CallId, CallStatus, MemberId};

/// Errors raised by the call record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("call {0} not found")]
    NotFound(CallId),

    #[error("call {0} already exists")]
    Duplicate(CallId),

    #[error("version conflict on call {call_id}: expected {expected}, found {found}")]
    VersionConflict {
        call_id: CallId,
        expected: u64,
        found: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by lifecycle and recording operations
#[derive(Debug, Error)]
pub enum CallError {
    #[error("invitee list must be non-empty, unique and exclude the initiator")]
    InvalidInviteeSet,

    #[error("participant {0} is not in invited status")]
    NotInvited(MemberId),

    #[error("member {0} is not the call initiator")]
    NotInitiator(MemberId),

    #[error("member {0} is not a participant of this call")]
    NotParticipant(MemberId),

    #[error("member {0} is not allowed to moderate recordings in this group")]
    NotAuthorized(MemberId),

    #[error("call {0} not found")]
    CallNotFound(CallId),

    #[error("call {0} has already ended")]
    CallEnded(CallId),

    #[error("call {0} is not active")]
    CallNotActive(CallId),

    #[error("call {0} is already being recorded by another device session")]
    AlreadyRecording(CallId),

    #[error("recording is disabled for call {0}")]
    RecordingDisabled(CallId),

    #[error("no capture mode is available: {0}")]
    RecordingUnavailable(String),

    #[error("call {0} is not recording")]
    NotRecording(CallId),

    #[error("device session {0} does not own this recording")]
    StaleSession(String),

    #[error("invalid call transition from {from} to {to}")]
    InvalidTransition { from: CallStatus, to: CallStatus },

    #[error("capture error: {0}")]
    Capture(String),

    #[error("segment upload failed: {0}")]
    Upload(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification used by the HTTP layer and by callers deciding
/// whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    StateConflict,
    Capture,
    Storage,
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::InvalidInviteeSet => ErrorKind::Validation,
            CallError::NotInvited(_)
            | CallError::NotInitiator(_)
            | CallError::NotParticipant(_)
            | CallError::NotAuthorized(_)
            | CallError::StaleSession(_) => ErrorKind::Authorization,
            CallError::CallNotFound(_) | CallError::Store(StoreError::NotFound(_)) => {
                ErrorKind::NotFound
            }
            CallError::CallEnded(_)
            | CallError::CallNotActive(_)
            | CallError::AlreadyRecording(_)
            | CallError::RecordingDisabled(_)
            | CallError::NotRecording(_)
            | CallError::InvalidTransition { .. } => ErrorKind::StateConflict,
            CallError::RecordingUnavailable(_) | CallError::Capture(_) | CallError::Upload(_) => {
                ErrorKind::Capture
            }
            CallError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            CallError::InvalidInviteeSet => "INVALID_INVITEE_SET",
            CallError::NotInvited(_) => "NOT_INVITED",
            CallError::NotInitiator(_) => "NOT_INITIATOR",
            CallError::NotParticipant(_) => "NOT_PARTICIPANT",
            CallError::NotAuthorized(_) => "NOT_AUTHORIZED",
            CallError::CallNotFound(_) => "CALL_NOT_FOUND",
            CallError::CallEnded(_) => "CALL_ENDED",
            CallError::CallNotActive(_) => "CALL_NOT_ACTIVE",
            CallError::AlreadyRecording(_) => "ALREADY_RECORDING",
            CallError::RecordingDisabled(_) => "RECORDING_DISABLED",
            CallError::RecordingUnavailable(_) => "RECORDING_UNAVAILABLE",
            CallError::NotRecording(_) => "NOT_RECORDING",
            CallError::StaleSession(_) => "STALE_SESSION",
            CallError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CallError::Capture(_) => "CAPTURE_ERROR",
            CallError::Upload(_) => "UPLOAD_ERROR",
            CallError::Store(StoreError::NotFound(_)) => "CALL_NOT_FOUND",
            CallError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Result type alias using CallError
pub type CallResult<T> = Result<T, CallError>;
