//! Segment Uploader
//!
//! Takes finished captures from the ghost recorder or a client fallback
//! capture, normalises them, stores the file, and appends the segment to
//! the call record.

mod storage;
mod transcode;
mod uploader;

pub use storage::{LocalSegmentStorage, SegmentStorage};
pub use transcode::{NormalizedFile, Transcoder, WavTranscoder};
pub use uploader::SegmentUploader;
