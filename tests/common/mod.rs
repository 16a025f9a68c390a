// Shared fixtures for integration tests: a fully wired in-memory service and
// fake capture hardware that produces short PCM segments on disk.
#![allow(dead_code)]

use anyhow::Result;
use callvault::call::{CallKind, CallRecord, GroupId, MemberId};
use callvault::client::LocalCaptureDevice;
use callvault::recording::{CaptureMode, CaptureSession, MediaTransport, PcmFormat, RawCapture};
use callvault::{
    CallController, CallLocks, CallService, ChannelTransport, InMemoryCallStore, LocalSegmentStorage,
    NoopEventPublisher, RecordingManager, SegmentUploader, StaticGroupPolicy, WavTranscoder,
};
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const GROUP: &str = "family";
pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const CAROL: &str = "carol";

/// 100 ms of 16 kHz mono audio
const SAMPLES_PER_SEGMENT: usize = 1600;

pub struct Harness {
    pub service: Arc<CallService>,
    pub store: Arc<InMemoryCallStore>,
    pub transport: Arc<FakeTransport>,
    /// Wired in place of `transport` by `with_channel_transport`
    pub channel: Arc<ChannelTransport>,
    pub locks: Arc<CallLocks>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(StaticGroupPolicy::new())
    }

    pub fn with_policy(policy: StaticGroupPolicy) -> Self {
        Self::build(policy, chrono::Duration::seconds(45), false)
    }

    pub fn with_ring_timeout(ring_timeout: chrono::Duration) -> Self {
        Self::build(StaticGroupPolicy::new(), ring_timeout, false)
    }

    /// Server capture fed through real media channels
    pub fn with_channel_transport() -> Self {
        Self::build(StaticGroupPolicy::new(), chrono::Duration::seconds(45), true)
    }

    fn build(policy: StaticGroupPolicy, ring_timeout: chrono::Duration, channels: bool) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(InMemoryCallStore::new());
        let policy = Arc::new(policy);
        let locks = Arc::new(CallLocks::new());
        let transport = Arc::new(FakeTransport::new(dir.path().join("capture")));
        let channel = Arc::new(ChannelTransport::new(dir.path().join("capture")));
        let media: Arc<dyn MediaTransport> = if channels {
            channel.clone()
        } else {
            transport.clone()
        };

        let uploader = Arc::new(SegmentUploader::new(
            store.clone(),
            Arc::new(WavTranscoder::new()),
            Arc::new(LocalSegmentStorage::new(dir.path().join("media"), "/media")),
            Arc::clone(&locks),
        ));
        // Rotation never fires during a test
        let recordings = Arc::new(RecordingManager::new(
            store.clone(),
            Arc::clone(&uploader),
            media,
            policy.clone(),
            Arc::clone(&locks),
            Duration::from_secs(3600),
        ));
        let controller = CallController::new(store.clone(), policy, ring_timeout);

        let service = Arc::new(CallService::new(
            controller,
            recordings,
            uploader,
            Arc::new(NoopEventPublisher),
            chrono::Duration::seconds(60),
        ));

        Self {
            service,
            store,
            transport,
            channel,
            locks,
            dir,
        }
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.dir.path().join("capture")
    }

    /// Ringing call from alice to bob
    pub async fn ringing_call(&self) -> Result<CallRecord> {
        Ok(self
            .service
            .create_call(
                GroupId::from(GROUP),
                MemberId::from(ALICE),
                vec![MemberId::from(BOB)],
                CallKind::Video,
            )
            .await?)
    }

    /// Call from alice to bob that bob accepted and joined
    pub async fn active_call(&self) -> Result<CallRecord> {
        let call = self.ringing_call().await?;
        let bob = MemberId::from(BOB);
        self.service
            .respond(&call.call_id, &bob, callvault::RespondAction::Accept)
            .await?;
        Ok(self.service.connect(&call.call_id, &bob).await?)
    }
}

/// Writes `SAMPLES_PER_SEGMENT` samples of PCM and describes them
pub fn write_pcm(dir: &std::path::Path, mode: CaptureMode) -> Result<RawCapture> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.pcm", uuid::Uuid::new_v4()));
    let bytes: Vec<u8> = (0..SAMPLES_PER_SEGMENT)
        .flat_map(|i| ((i % 128) as i16).to_le_bytes())
        .collect();
    std::fs::write(&path, bytes)?;

    Ok(RawCapture {
        path,
        started_at: Utc::now(),
        duration_ms: 100,
        mode,
        pcm: Some(PcmFormat {
            sample_rate: 16000,
            channels: 1,
        }),
    })
}

/// Capture that yields one short segment per cut
pub struct FakeCapture {
    dir: PathBuf,
    mode: CaptureMode,
    closed: bool,
}

impl FakeCapture {
    pub fn new(dir: PathBuf, mode: CaptureMode) -> Self {
        Self {
            dir,
            mode,
            closed: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureSession for FakeCapture {
    async fn cut(&mut self) -> Result<Option<RawCapture>> {
        if self.closed {
            return Ok(None);
        }
        write_pcm(&self.dir, self.mode).map(Some)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn mode(&self) -> CaptureMode {
        self.mode
    }
}

/// Server-side transport whose availability can be toggled
pub struct FakeTransport {
    dir: PathBuf,
    available: AtomicBool,
    opened: AtomicUsize,
}

impl FakeTransport {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            available: AtomicBool::new(true),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MediaTransport for FakeTransport {
    async fn open_capture(&self, call: &CallRecord) -> Result<Box<dyn CaptureSession>> {
        if !self.available.load(Ordering::SeqCst) {
            anyhow::bail!("no media route for call {}", call.call_id);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture::new(
            self.dir.clone(),
            CaptureMode::AudioOnly,
        )))
    }
}

/// Device hardware where some capture modes fail to open
pub struct FakeDevice {
    dir: PathBuf,
    broken: HashSet<CaptureMode>,
    opened: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub fn new(dir: PathBuf, broken: &[CaptureMode]) -> Self {
        Self {
            dir,
            broken: broken.iter().copied().collect(),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn open_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opened)
    }
}

#[async_trait::async_trait]
impl LocalCaptureDevice for FakeDevice {
    async fn open(&self, mode: CaptureMode) -> Result<Box<dyn CaptureSession>> {
        if self.broken.contains(&mode) {
            anyhow::bail!("{:?} capture not supported on this device", mode);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture::new(self.dir.clone(), mode)))
    }
}
