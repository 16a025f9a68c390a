use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::upload::SegmentSink;
use crate::call::{CallId, Segment};
use crate::error::{CallError, CallResult};
use crate::recording::{CaptureMode, CaptureSession, RawCapture};

/// Capture modes tried by a device, best first
pub const FALLBACK_ORDER: [CaptureMode; 3] = [
    CaptureMode::AudioVideo,
    CaptureMode::AudioOnly,
    CaptureMode::MinimalAudio,
];

/// Local capture hardware of a device
#[async_trait::async_trait]
pub trait LocalCaptureDevice: Send + Sync {
    async fn open(&self, mode: CaptureMode) -> Result<Box<dyn CaptureSession>>;
}

/// One step of the fallback chain
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureAttempt {
    pub mode: CaptureMode,
    /// `None` when the mode opened
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum FallbackOutcome {
    Recording {
        mode: CaptureMode,
        attempts: Vec<CaptureAttempt>,
    },
    Unavailable {
        attempts: Vec<CaptureAttempt>,
    },
}

impl FallbackOutcome {
    pub fn mode(&self) -> Option<CaptureMode> {
        match self {
            FallbackOutcome::Recording { mode, .. } => Some(*mode),
            FallbackOutcome::Unavailable { .. } => None,
        }
    }

    pub fn attempts(&self) -> &[CaptureAttempt] {
        match self {
            FallbackOutcome::Recording { attempts, .. } => attempts,
            FallbackOutcome::Unavailable { attempts } => attempts,
        }
    }

    /// `RecordingUnavailable` when every mode failed
    pub fn into_result(self, call_id: &CallId) -> CallResult<CaptureMode> {
        match self {
            FallbackOutcome::Recording { mode, .. } => Ok(mode),
            FallbackOutcome::Unavailable { attempts } => {
                let tried = attempts
                    .iter()
                    .map(|a| format!("{:?}: {}", a.mode, a.error.as_deref().unwrap_or("ok")))
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(CallError::RecordingUnavailable(format!(
                    "call {}: {}",
                    call_id, tried
                )))
            }
        }
    }
}

/// Device-side recorder used when the server cannot capture the call
///
/// Opens the best capture mode the device supports. A failure of every mode
/// leaves the call unrecorded; it never aborts the call.
pub struct FallbackRecorder {
    call_id: CallId,
    device: Box<dyn LocalCaptureDevice>,
    session: Option<Box<dyn CaptureSession>>,
}

impl FallbackRecorder {
    pub fn new(call_id: CallId, device: Box<dyn LocalCaptureDevice>) -> Self {
        Self {
            call_id,
            device,
            session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.session.as_ref().map(|s| s.mode())
    }

    /// Walk the fallback chain. Already capturing returns the current mode
    /// without reopening the device.
    pub async fn start(&mut self) -> FallbackOutcome {
        if let Some(session) = &self.session {
            let mode = session.mode();
            info!(
                "Call {} local capture already running in {:?}",
                self.call_id, mode
            );
            return FallbackOutcome::Recording {
                mode,
                attempts: Vec::new(),
            };
        }

        let mut attempts = Vec::with_capacity(FALLBACK_ORDER.len());
        for mode in FALLBACK_ORDER {
            match self.device.open(mode).await {
                Ok(session) => {
                    attempts.push(CaptureAttempt { mode, error: None });
                    info!("Call {} local capture started in {:?}", self.call_id, mode);
                    self.session = Some(session);
                    return FallbackOutcome::Recording { mode, attempts };
                }
                Err(e) => {
                    warn!(
                        "Call {} local capture {:?} unavailable: {:#}",
                        self.call_id, mode, e
                    );
                    attempts.push(CaptureAttempt {
                        mode,
                        error: Some(format!("{:#}", e)),
                    });
                }
            }
        }

        warn!(
            "Call {} continues unrecorded, no capture mode available",
            self.call_id
        );
        FallbackOutcome::Unavailable { attempts }
    }

    /// Close the current segment
    pub async fn cut(&mut self) -> Result<Option<RawCapture>> {
        match &mut self.session {
            Some(session) => session.cut().await,
            None => Ok(None),
        }
    }

    /// Cut and upload the open segment
    pub async fn cut_and_upload(&mut self, sink: &dyn SegmentSink) -> Result<Option<Segment>> {
        match self.cut().await? {
            Some(raw) => Ok(Some(sink.upload(raw).await?)),
            None => Ok(None),
        }
    }

    /// Stop capturing, discarding media not yet cut
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.close().await?;
            info!("Call {} local capture stopped", self.call_id);
        }
        Ok(())
    }

    /// Upload the last segment, then release the device. The device is
    /// released even when the upload fails.
    pub async fn stop_and_upload(&mut self, sink: &dyn SegmentSink) -> Result<Option<Segment>> {
        let uploaded = self.cut_and_upload(sink).await;
        self.stop().await?;
        uploaded
    }
}
