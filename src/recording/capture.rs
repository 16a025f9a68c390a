use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use super::pcm::PcmCaptureSession;
use crate::call::{CallId, CallRecord};

/// Capture quality, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    AudioVideo,
    AudioOnly,
    MinimalAudio,
}

/// Raw PCM layout (16-bit little endian, interleaved)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A finished, not yet normalised piece of captured media
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub mode: CaptureMode,
    /// Set when `path` holds headerless PCM
    pub pcm: Option<PcmFormat>,
}

/// Audio sample data delivered by the media transport
#[derive(Debug, Clone)]
pub struct MediaFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Milliseconds since the transport connected
    pub timestamp_ms: u64,
}

/// An open capture against the media transport
#[async_trait::async_trait]
pub trait CaptureSession: Send {
    /// Close the current segment and return it. `None` when nothing was
    /// captured since the previous cut.
    async fn cut(&mut self) -> Result<Option<RawCapture>>;

    /// Stop capturing. Media not yet cut is discarded.
    async fn close(&mut self) -> Result<()>;

    fn mode(&self) -> CaptureMode;
}

/// Server side of the real-time media transport
#[async_trait::async_trait]
pub trait MediaTransport: Send + Sync {
    /// Open a ghost-recorder capture for the call
    async fn open_capture(&self, call: &CallRecord) -> Result<Box<dyn CaptureSession>>;

    /// Forget whatever the transport holds for a finished call
    async fn release(&self, _call_id: &CallId) {}
}

/// Audio feeds waiting for a capture, keyed by call
pub(crate) type FeedMap = Arc<Mutex<HashMap<CallId, mpsc::Receiver<MediaFrame>>>>;

/// Transport fed through channels: the media layer attaches one audio feed
/// per call and the ghost recorder drains it into raw PCM chunks.
///
/// A feed stays attached for the whole call. A capture checks it out and
/// hands it back on close; frames sent while nothing records are dropped
/// on the next start.
pub struct ChannelTransport {
    work_dir: PathBuf,
    feeds: FeedMap,
}

impl ChannelTransport {
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            feeds: FeedMap::default(),
        }
    }

    /// Register the audio feed of a call, replacing any earlier one
    pub async fn attach(&self, call_id: CallId) -> mpsc::Sender<MediaFrame> {
        let (tx, rx) = mpsc::channel(256);
        self.feeds.lock().await.insert(call_id, rx);
        info!("Media feed attached for call {}", call_id);
        tx
    }

    /// Whether a feed is attached and not held by a running capture
    pub async fn has_feed(&self, call_id: &CallId) -> bool {
        self.feeds.lock().await.contains_key(call_id)
    }
}

#[async_trait::async_trait]
impl MediaTransport for ChannelTransport {
    async fn open_capture(&self, call: &CallRecord) -> Result<Box<dyn CaptureSession>> {
        let feed = self.feeds.lock().await.remove(&call.call_id);
        let Some(mut rx) = feed else {
            anyhow::bail!("no media feed attached for call {}", call.call_id);
        };
        while rx.try_recv().is_ok() {}

        let session = PcmCaptureSession::start(call.call_id, self.work_dir.clone(), rx)?
            .return_feed_to(Arc::clone(&self.feeds));
        Ok(Box::new(session))
    }

    async fn release(&self, call_id: &CallId) {
        if self.feeds.lock().await.remove(call_id).is_some() {
            info!("Media feed detached for call {}", call_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallKind, GroupId, MemberId, RecordingState};
    use std::time::Duration;
    use tempfile::TempDir;

    fn call() -> CallRecord {
        CallRecord::new(
            GroupId::from("g"),
            MemberId::from("a"),
            &[MemberId::from("b")],
            CallKind::Phone,
            RecordingState::new(true),
        )
    }

    #[tokio::test]
    async fn test_open_capture_requires_feed() {
        let dir = TempDir::new().unwrap();
        let transport = ChannelTransport::new(dir.path().into());

        assert!(transport.open_capture(&call()).await.is_err());
    }

    #[tokio::test]
    async fn test_attached_feed_is_captured() {
        let dir = TempDir::new().unwrap();
        let transport = ChannelTransport::new(dir.path().into());
        let record = call();

        let tx = transport.attach(record.call_id).await;
        assert!(transport.has_feed(&record.call_id).await);

        let mut session = transport.open_capture(&record).await.unwrap();
        // Checked out while the capture runs
        assert!(!transport.has_feed(&record.call_id).await);

        tx.send(MediaFrame {
            samples: vec![1i16; 8000],
            sample_rate: 8000,
            channels: 1,
            timestamp_ms: 0,
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let raw = session.cut().await.unwrap().expect("segment");
        assert_eq!(raw.duration_ms, 1000);
        assert_eq!(raw.mode, CaptureMode::AudioOnly);
        session.close().await.unwrap();
        assert!(transport.has_feed(&record.call_id).await);
    }

    #[tokio::test]
    async fn test_feed_survives_until_release() {
        let dir = TempDir::new().unwrap();
        let transport = ChannelTransport::new(dir.path().into());
        let record = call();
        let _tx = transport.attach(record.call_id).await;

        let mut first = transport.open_capture(&record).await.unwrap();
        first.close().await.unwrap();
        let mut second = transport.open_capture(&record).await.unwrap();
        second.close().await.unwrap();

        transport.release(&record.call_id).await;
        assert!(!transport.has_feed(&record.call_id).await);
        assert!(transport.open_capture(&record).await.is_err());
    }
}
