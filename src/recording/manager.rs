use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::capture::{CaptureSession, MediaTransport, RawCapture};
use super::locks::{CallGuard, CallLocks};
use super::policy::GroupPolicy;
use crate::call::{
    CallId, CallStatus, CaptureSource, DeviceSessionId, MemberId, RecordingState,
    RecordingStatus, Segment,
};
use crate::error::{CallError, CallResult};
use crate::segments::SegmentUploader;
use crate::store::{self, CallStore};

/// A server-side capture bound to one call
struct ActiveCapture {
    session: Arc<Mutex<Box<dyn CaptureSession>>>,
    rotation: JoinHandle<()>,
}

/// Owns the "one recorder per call" rule
///
/// Only the initiator drives recording, and only from the device session
/// that started it. Every operation runs under the call's lock.
pub struct RecordingManager {
    store: Arc<dyn CallStore>,
    uploader: Arc<SegmentUploader>,
    transport: Arc<dyn MediaTransport>,
    policy: Arc<dyn GroupPolicy>,
    locks: Arc<CallLocks>,
    captures: Mutex<HashMap<CallId, ActiveCapture>>,
    segment_duration: Duration,
}

impl RecordingManager {
    pub fn new(
        store: Arc<dyn CallStore>,
        uploader: Arc<SegmentUploader>,
        transport: Arc<dyn MediaTransport>,
        policy: Arc<dyn GroupPolicy>,
        locks: Arc<CallLocks>,
        segment_duration: Duration,
    ) -> Self {
        Self {
            store,
            uploader,
            transport,
            policy,
            locks,
            captures: Mutex::new(HashMap::new()),
            segment_duration,
        }
    }

    /// Start recording an active call.
    ///
    /// A repeated start from the owning device session returns the current
    /// state. When the transport cannot capture server-side the recording is
    /// still opened with `source = client` and the owner device uploads.
    pub async fn start_recording(
        &self,
        call_id: &CallId,
        requester: &MemberId,
        device: &DeviceSessionId,
    ) -> CallResult<RecordingState> {
        let guard = self.locks.lock(*call_id).await;
        let result = self.start_locked(&guard, requester, device).await;
        self.unlock(guard).await;
        result
    }

    async fn start_locked(
        &self,
        guard: &CallGuard,
        requester: &MemberId,
        device: &DeviceSessionId,
    ) -> CallResult<RecordingState> {
        let call_id = guard.call_id();
        let record = store::load(&*self.store, call_id).await?;

        if !record.is_initiator(requester) {
            return Err(CallError::NotInitiator(requester.clone()));
        }
        if record.status.is_terminal() {
            return Err(CallError::CallEnded(*call_id));
        }
        if record.status != CallStatus::Active {
            return Err(CallError::CallNotActive(*call_id));
        }

        match record.recording.status {
            RecordingStatus::Disabled => return Err(CallError::RecordingDisabled(*call_id)),
            RecordingStatus::Recording if record.recording.is_owned_by(device) => {
                info!(
                    "Call {} duplicate start from owner session {}, keeping current recording",
                    call_id, device
                );
                return Ok(record.recording);
            }
            RecordingStatus::Recording => {
                warn!(
                    "Call {} start from session {} rejected, already owned by {:?}",
                    call_id, device, record.recording.owner_device_session_id
                );
                return Err(CallError::AlreadyRecording(*call_id));
            }
            _ => {}
        }

        if !self.policy.recording_enabled(&record.group_id) {
            store::mutate(&*self.store, call_id, |rec| {
                rec.recording.status = RecordingStatus::Disabled;
                Ok(true)
            })
            .await?;
            return Err(CallError::RecordingDisabled(*call_id));
        }

        let mut capture = match self.transport.open_capture(&record).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(
                    "Call {} server capture unavailable, owner device records locally: {:#}",
                    call_id, e
                );
                None
            }
        };
        let source = if capture.is_some() {
            CaptureSource::Server
        } else {
            CaptureSource::Client
        };

        let saved = store::mutate(&*self.store, call_id, |rec| {
            if rec.status.is_terminal() {
                return Err(CallError::CallEnded(*call_id));
            }
            rec.recording.status = RecordingStatus::Recording;
            rec.recording.owner_device_session_id = Some(device.clone());
            rec.recording.source = Some(source);
            Ok(true)
        })
        .await;

        let saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                if let Some(session) = capture.as_mut() {
                    if let Err(close) = session.close().await {
                        warn!("Call {} failed to close capture: {:#}", call_id, close);
                    }
                }
                return Err(e);
            }
        };

        if let Some(session) = capture {
            self.attach_capture(guard, session).await;
        }

        info!(
            "Call {} recording started by {} (session {}, source {:?})",
            call_id, requester, device, source
        );
        Ok(saved.recording)
    }

    /// Stop recording. A no-op unless a recording is running; a stop from a
    /// device session that does not own the recording is ignored.
    pub async fn stop_recording(
        &self,
        call_id: &CallId,
        requester: &MemberId,
        device: &DeviceSessionId,
    ) -> CallResult<RecordingState> {
        let guard = self.locks.lock(*call_id).await;
        let result = self.stop_locked(&guard, requester, device).await;
        self.unlock(guard).await;
        result
    }

    async fn stop_locked(
        &self,
        guard: &CallGuard,
        requester: &MemberId,
        device: &DeviceSessionId,
    ) -> CallResult<RecordingState> {
        let call_id = guard.call_id();
        let record = store::load(&*self.store, call_id).await?;

        if !record.is_initiator(requester) {
            return Err(CallError::NotInitiator(requester.clone()));
        }
        if record.recording.status != RecordingStatus::Recording {
            return Ok(record.recording);
        }
        if !record.recording.is_owned_by(device) {
            warn!(
                "Call {} ignoring stop from stale session {} (owner {:?})",
                call_id, device, record.recording.owner_device_session_id
            );
            return Ok(record.recording);
        }

        let state = self
            .flush(
                guard,
                RecordingStatus::Stopping,
                RecordingStatus::Idle,
                RecordingStatus::Error,
            )
            .await?;
        info!("Call {} recording stopped ({})", call_id, state.status);
        Ok(state)
    }

    /// Flush and seal the recording of a call that reached a terminal
    /// state, then drop the call's media feed and lock entry.
    pub async fn finalize(&self, call_id: &CallId) -> CallResult<RecordingState> {
        let guard = self.locks.lock(*call_id).await;
        let result = self.finalize_locked(&guard).await;
        self.transport.release(call_id).await;
        self.unlock(guard).await;
        result
    }

    async fn finalize_locked(&self, guard: &CallGuard) -> CallResult<RecordingState> {
        let call_id = guard.call_id();
        let record = store::load(&*self.store, call_id).await?;

        let state = match record.recording.status {
            RecordingStatus::Recording => {
                self.flush(
                    guard,
                    RecordingStatus::Processing,
                    RecordingStatus::Completed,
                    RecordingStatus::Error,
                )
                .await?
            }
            RecordingStatus::Idle if !record.recording.segments.is_empty() => {
                store::mutate(&*self.store, call_id, |rec| {
                    rec.recording.status = RecordingStatus::Completed;
                    Ok(true)
                })
                .await?
                .recording
            }
            _ => record.recording,
        };

        info!("Call {} recording finalized ({})", call_id, state.status);
        Ok(state)
    }

    /// Turn recording off for the rest of the call
    pub async fn disable_recording(
        &self,
        call_id: &CallId,
        actor: &MemberId,
    ) -> CallResult<RecordingState> {
        let guard = self.locks.lock(*call_id).await;
        let result = self.disable_locked(&guard, actor).await;
        self.unlock(guard).await;
        result
    }

    async fn disable_locked(&self, guard: &CallGuard, actor: &MemberId) -> CallResult<RecordingState> {
        let call_id = guard.call_id();
        let record = store::load(&*self.store, call_id).await?;

        if !self.policy.can_moderate(&record.group_id, actor) {
            return Err(CallError::NotAuthorized(actor.clone()));
        }
        if record.status.is_terminal() {
            return Err(CallError::CallEnded(*call_id));
        }

        let state = match record.recording.status {
            RecordingStatus::Disabled => record.recording,
            RecordingStatus::Recording => {
                self.flush(
                    guard,
                    RecordingStatus::Stopping,
                    RecordingStatus::Disabled,
                    RecordingStatus::Disabled,
                )
                .await?
            }
            _ => {
                store::mutate(&*self.store, call_id, |rec| {
                    rec.recording.status = RecordingStatus::Disabled;
                    rec.recording.owner_device_session_id = None;
                    Ok(true)
                })
                .await?
                .recording
            }
        };

        info!("Call {} recording disabled by {}", call_id, actor);
        Ok(state)
    }

    /// Hide or unhide a call's recording
    pub async fn set_hidden(
        &self,
        call_id: &CallId,
        actor: &MemberId,
        hidden: bool,
    ) -> CallResult<RecordingState> {
        let record = store::load(&*self.store, call_id).await?;
        if !self.policy.can_moderate(&record.group_id, actor) {
            return Err(CallError::NotAuthorized(actor.clone()));
        }

        let saved = store::mutate(&*self.store, call_id, |rec| {
            if rec.recording.is_hidden == hidden {
                return Ok(false);
            }
            rec.recording.is_hidden = hidden;
            if hidden {
                rec.recording.hidden_by = Some(actor.clone());
                rec.recording.hidden_at = Some(chrono::Utc::now());
            } else {
                rec.recording.hidden_by = None;
                rec.recording.hidden_at = None;
            }
            Ok(true)
        })
        .await?;

        info!("Call {} recording hidden={} by {}", call_id, hidden, actor);
        Ok(saved.recording)
    }

    /// Append a segment captured on the owner device
    pub async fn append_client_segment(
        &self,
        call_id: &CallId,
        requester: &MemberId,
        device: &DeviceSessionId,
        raw: RawCapture,
    ) -> CallResult<Segment> {
        let guard = self.locks.lock(*call_id).await;
        let result = self.append_client_locked(&guard, requester, device, raw).await;
        self.unlock(guard).await;
        result
    }

    async fn append_client_locked(
        &self,
        guard: &CallGuard,
        requester: &MemberId,
        device: &DeviceSessionId,
        raw: RawCapture,
    ) -> CallResult<Segment> {
        let call_id = guard.call_id();
        let record = store::load(&*self.store, call_id).await?;

        if !record.is_initiator(requester) {
            return Err(CallError::NotInitiator(requester.clone()));
        }
        if !record.recording.status.accepts_segments() {
            return Err(CallError::NotRecording(*call_id));
        }
        if !record.recording.is_owned_by(device) {
            return Err(CallError::StaleSession(device.to_string()));
        }

        self.uploader.append_locked(guard, raw).await
    }

    /// Segments of a call ordered by `chunkIndex`
    pub async fn segments(&self, call_id: &CallId) -> CallResult<Vec<Segment>> {
        let record = store::load(&*self.store, call_id).await?;
        let mut segments = record.recording.segments;
        segments.sort_by_key(|s| s.chunk_index);
        Ok(segments)
    }

    pub async fn has_server_capture(&self, call_id: &CallId) -> bool {
        self.captures.lock().await.contains_key(call_id)
    }

    /// Release the guard, dropping the lock entry once the call is over
    async fn unlock(&self, guard: CallGuard) {
        let call_over = store::is_over(&*self.store, guard.call_id()).await;
        self.locks.unlock(guard, call_over).await;
    }

    async fn attach_capture(&self, guard: &CallGuard, session: Box<dyn CaptureSession>) {
        let call_id = *guard.call_id();
        let session = Arc::new(Mutex::new(session));
        let rotation = tokio::spawn(rotate_segments(
            call_id,
            Arc::clone(&self.locks),
            Arc::clone(&self.uploader),
            Arc::clone(&session),
            self.segment_duration,
        ));

        let previous = self
            .captures
            .lock()
            .await
            .insert(call_id, ActiveCapture { session, rotation });
        if let Some(previous) = previous {
            previous.rotation.abort();
            let mut old = previous.session.lock().await;
            if let Err(e) = old.close().await {
                warn!("Call {} failed to close replaced capture: {:#}", call_id, e);
            }
        }
    }

    /// Move to `interim`, upload the open segment, close the capture and
    /// settle on `on_success` or `on_failure`. A failed flush never fails
    /// the caller's call operation.
    async fn flush(
        &self,
        guard: &CallGuard,
        interim: RecordingStatus,
        on_success: RecordingStatus,
        on_failure: RecordingStatus,
    ) -> CallResult<RecordingState> {
        let call_id = *guard.call_id();
        store::mutate(&*self.store, &call_id, |rec| {
            rec.recording.status = interim;
            Ok(true)
        })
        .await?;

        let capture = self.captures.lock().await.remove(&call_id);
        let mut flushed = true;

        if let Some(active) = capture {
            active.rotation.abort();
            let mut session = active.session.lock().await;

            match session.cut().await {
                Ok(Some(raw)) => {
                    if let Err(e) = self.uploader.append_locked(guard, raw).await {
                        error!("Call {} final segment upload failed: {}", call_id, e);
                        flushed = false;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Call {} failed to cut final segment: {:#}", call_id, e);
                    flushed = false;
                }
            }

            if let Err(e) = session.close().await {
                warn!("Call {} failed to close capture: {:#}", call_id, e);
            }
        }

        let settled = if flushed { on_success } else { on_failure };
        let record = store::mutate(&*self.store, &call_id, |rec| {
            rec.recording.status = settled;
            rec.recording.owner_device_session_id = None;
            rec.recording.source = None;
            Ok(true)
        })
        .await?;

        Ok(record.recording)
    }
}

/// Cut the server capture into segments every `period`
async fn rotate_segments(
    call_id: CallId,
    locks: Arc<CallLocks>,
    uploader: Arc<SegmentUploader>,
    session: Arc<Mutex<Box<dyn CaptureSession>>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let guard = locks.lock(call_id).await;

        let cut = session.lock().await.cut().await;
        match cut {
            Ok(Some(raw)) => {
                if let Err(e) = uploader.append_locked(&guard, raw).await {
                    error!("Call {} segment rotation upload failed: {}", call_id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Call {} segment rotation cut failed: {:#}", call_id, e),
        }
    }
}
