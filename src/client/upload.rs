use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::call::{CallId, DeviceSessionId, MemberId, Segment};
use crate::recording::{CaptureMode, RawCapture};
use crate::service::CallService;

/// Where a device sends the segments it captured
#[async_trait::async_trait]
pub trait SegmentSink: Send + Sync {
    async fn upload(&self, raw: RawCapture) -> Result<Segment>;
}

/// Uploads straight into an in-process service
pub struct InProcessSegmentSink {
    service: Arc<CallService>,
    call_id: CallId,
    requester: MemberId,
    device: DeviceSessionId,
}

impl InProcessSegmentSink {
    pub fn new(
        service: Arc<CallService>,
        call_id: CallId,
        requester: MemberId,
        device: DeviceSessionId,
    ) -> Self {
        Self {
            service,
            call_id,
            requester,
            device,
        }
    }
}

#[async_trait::async_trait]
impl SegmentSink for InProcessSegmentSink {
    async fn upload(&self, raw: RawCapture) -> Result<Segment> {
        Ok(self
            .service
            .append_client_segment(&self.call_id, &self.requester, &self.device, raw)
            .await?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery<'a> {
    requester_id: &'a str,
    device_session_id: &'a str,
    started_at: String,
    duration_ms: u64,
    mode: CaptureMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

/// Uploads to `POST /calls/:call_id/recording/segments`
#[derive(Debug, Clone)]
pub struct HttpSegmentSink {
    client: reqwest::Client,
    base_url: String,
    call_id: CallId,
    requester: MemberId,
    device: DeviceSessionId,
}

impl HttpSegmentSink {
    pub fn new(
        base_url: impl Into<String>,
        call_id: CallId,
        requester: MemberId,
        device: DeviceSessionId,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            call_id,
            requester,
            device,
        }
    }
}

#[async_trait::async_trait]
impl SegmentSink for HttpSegmentSink {
    async fn upload(&self, raw: RawCapture) -> Result<Segment> {
        let body = tokio::fs::read(&raw.path)
            .await
            .with_context(|| format!("Failed to read capture {:?}", raw.path))?;

        let format = match raw.pcm {
            Some(_) => None,
            None => raw
                .path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string),
        };
        let query = UploadQuery {
            requester_id: self.requester.as_str(),
            device_session_id: self.device.as_str(),
            started_at: raw.started_at.to_rfc3339(),
            duration_ms: raw.duration_ms,
            mode: raw.mode,
            sample_rate: raw.pcm.map(|f| f.sample_rate),
            channels: raw.pcm.map(|f| f.channels),
            format,
        };

        let url = format!(
            "{}/calls/{}/recording/segments",
            self.base_url, self.call_id
        );
        let segment = self
            .client
            .post(&url)
            .query(&query)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload segment to {}", url))?
            .error_for_status()
            .with_context(|| format!("Segment rejected by {}", url))?
            .json()
            .await
            .context("Failed to decode uploaded segment")?;

        // The server keeps its own copy once accepted
        if let Err(e) = tokio::fs::remove_file(&raw.path).await {
            tracing::warn!("Failed to remove uploaded capture {:?}: {}", raw.path, e);
        }
        Ok(segment)
    }
}
