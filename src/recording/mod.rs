//! Recording Session Manager
//!
//! Attaches at most one ghost recorder to an active call, cuts it into
//! segments, and flushes the last segment when recording stops or the call
//! ends.

mod capture;
mod locks;
mod manager;
mod pcm;
mod policy;

pub use capture::{
    CaptureMode, CaptureSession, ChannelTransport, MediaFrame, MediaTransport, PcmFormat,
    RawCapture,
};
pub use locks::{CallGuard, CallLocks};
pub use manager::RecordingManager;
pub use pcm::PcmCaptureSession;
pub use policy::{GroupPolicy, StaticGroupPolicy};
