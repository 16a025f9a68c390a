//! Device-side pieces: the reconciliation poller and its cache, call
//! sources, and the local capture fallback chain.

mod cache;
mod fallback;
mod poller;
mod source;
mod upload;

pub use cache::{CallChange, LocalCallView};
pub use fallback::{
    CaptureAttempt, FallbackOutcome, FallbackRecorder, LocalCaptureDevice, FALLBACK_ORDER,
};
pub use poller::{LocalCallSink, PollSummary, PollerHandle, ReconciliationPoller, StopReason};
pub use source::{CallSource, HttpCallSource};
pub use upload::{HttpSegmentSink, InProcessSegmentSink, SegmentSink};
