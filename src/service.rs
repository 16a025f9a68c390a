//! Call-facing operations
//!
//! Wires the lifecycle controller to the recording manager: whenever a call
//! reaches a terminal state its recording is flushed and sealed.

use chrono::Duration;
use std::sync::Arc;
use tracing::{error, warn};

use crate::call::{
    CallId, CallKind, CallRecord, DeviceSessionId, GroupId, MemberId, RecordingState, Segment,
};
use crate::error::CallResult;
use crate::events::{CallEventKind, CallEventPublisher};
use crate::lifecycle::{CallController, LeaveOutcome, RespondAction};
use crate::recording::{RawCapture, RecordingManager};
use crate::segments::SegmentUploader;

pub struct CallService {
    controller: CallController,
    recordings: Arc<RecordingManager>,
    uploader: Arc<SegmentUploader>,
    events: Arc<dyn CallEventPublisher>,
    recently_ended_window: Duration,
}

impl CallService {
    pub fn new(
        controller: CallController,
        recordings: Arc<RecordingManager>,
        uploader: Arc<SegmentUploader>,
        events: Arc<dyn CallEventPublisher>,
        recently_ended_window: Duration,
    ) -> Self {
        Self {
            controller,
            recordings,
            uploader,
            events,
            recently_ended_window,
        }
    }

    pub fn recordings(&self) -> &Arc<RecordingManager> {
        &self.recordings
    }

    pub async fn create_call(
        &self,
        group_id: GroupId,
        initiator_id: MemberId,
        invitee_ids: Vec<MemberId>,
        kind: CallKind,
    ) -> CallResult<CallRecord> {
        let record = self
            .controller
            .create_call(group_id, initiator_id, invitee_ids, kind)
            .await?;
        self.emit(CallEventKind::Created, &record).await;
        Ok(record)
    }

    pub async fn respond(
        &self,
        call_id: &CallId,
        participant_id: &MemberId,
        action: RespondAction,
    ) -> CallResult<CallRecord> {
        let record = self.controller.respond(call_id, participant_id, action).await?;
        self.after_status_change(record).await
    }

    /// Transport connection signal
    pub async fn connect(&self, call_id: &CallId, participant_id: &MemberId) -> CallResult<CallRecord> {
        let before = self.controller.get_call(call_id).await?.version;
        let record = self.controller.connect(call_id, participant_id).await?;
        if record.version != before {
            self.emit(CallEventKind::Status, &record).await;
        }
        Ok(record)
    }

    pub async fn leave(&self, call_id: &CallId, participant_id: &MemberId) -> CallResult<LeaveOutcome> {
        let outcome = self.controller.leave(call_id, participant_id).await?;
        let record = self.after_status_change(outcome.record).await?;
        Ok(LeaveOutcome {
            call_ended: outcome.call_ended,
            record,
        })
    }

    pub async fn end(&self, call_id: &CallId, actor_id: &MemberId) -> CallResult<CallRecord> {
        let record = self.controller.end(call_id, actor_id).await?;
        self.after_status_change(record).await
    }

    pub async fn expire(&self, call_id: &CallId) -> CallResult<CallRecord> {
        let record = self.controller.expire(call_id).await?;
        self.after_status_change(record).await
    }

    /// Expire every call that rang past the timeout; returns how many
    pub async fn expire_stale(&self) -> CallResult<usize> {
        let due = self.controller.expired_calls().await?;
        let results = futures::future::join_all(due.iter().map(|id| self.expire(id))).await;

        let mut expired = 0;
        for (call_id, result) in due.iter().zip(results) {
            match result {
                Ok(record) if record.status.is_terminal() => expired += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to expire call {}: {}", call_id, e),
            }
        }
        Ok(expired)
    }

    pub async fn get_call(&self, call_id: &CallId) -> CallResult<CallRecord> {
        self.controller.get_call(call_id).await
    }

    /// Group poll: open calls plus recently terminated ones
    pub async fn poll_group(&self, group_id: &GroupId) -> CallResult<Vec<CallRecord>> {
        self.controller
            .poll_group(group_id, self.recently_ended_window)
            .await
    }

    pub async fn start_recording(
        &self,
        call_id: &CallId,
        requester: &MemberId,
        device: &DeviceSessionId,
    ) -> CallResult<RecordingState> {
        let state = self
            .recordings
            .start_recording(call_id, requester, device)
            .await?;
        self.emit_current(CallEventKind::Recording, call_id).await;
        Ok(state)
    }

    pub async fn stop_recording(
        &self,
        call_id: &CallId,
        requester: &MemberId,
        device: &DeviceSessionId,
    ) -> CallResult<RecordingState> {
        let state = self
            .recordings
            .stop_recording(call_id, requester, device)
            .await?;
        self.emit_current(CallEventKind::Recording, call_id).await;
        Ok(state)
    }

    /// Append a server-captured segment
    pub async fn append_segment(&self, call_id: &CallId, raw: RawCapture) -> CallResult<Segment> {
        let segment = self.uploader.append_segment(call_id, raw).await?;
        self.emit_current(CallEventKind::Segment, call_id).await;
        Ok(segment)
    }

    /// Append a segment captured on the owner device
    pub async fn append_client_segment(
        &self,
        call_id: &CallId,
        requester: &MemberId,
        device: &DeviceSessionId,
        raw: RawCapture,
    ) -> CallResult<Segment> {
        let segment = self
            .recordings
            .append_client_segment(call_id, requester, device, raw)
            .await?;
        self.emit_current(CallEventKind::Segment, call_id).await;
        Ok(segment)
    }

    pub async fn segments(&self, call_id: &CallId) -> CallResult<Vec<Segment>> {
        self.recordings.segments(call_id).await
    }

    pub async fn set_hidden(
        &self,
        call_id: &CallId,
        actor: &MemberId,
        hidden: bool,
    ) -> CallResult<RecordingState> {
        let state = self.recordings.set_hidden(call_id, actor, hidden).await?;
        self.emit_current(CallEventKind::Recording, call_id).await;
        Ok(state)
    }

    pub async fn disable_recording(
        &self,
        call_id: &CallId,
        actor: &MemberId,
    ) -> CallResult<RecordingState> {
        let state = self.recordings.disable_recording(call_id, actor).await?;
        self.emit_current(CallEventKind::Recording, call_id).await;
        Ok(state)
    }

    /// Seal the recording of a call that just became terminal. Recording
    /// failures are logged; the call record is returned regardless.
    async fn after_status_change(&self, record: CallRecord) -> CallResult<CallRecord> {
        if !record.status.is_terminal() {
            self.emit(CallEventKind::Status, &record).await;
            return Ok(record);
        }

        if let Err(e) = self.recordings.finalize(&record.call_id).await {
            error!("Call {} recording finalize failed: {}", record.call_id, e);
        }

        let record = self.controller.get_call(&record.call_id).await?;
        self.emit(CallEventKind::Status, &record).await;
        Ok(record)
    }

    async fn emit_current(&self, kind: CallEventKind, call_id: &CallId) {
        match self.controller.get_call(call_id).await {
            Ok(record) => self.emit(kind, &record).await,
            Err(e) => warn!("Call {} event skipped: {}", call_id, e),
        }
    }

    async fn emit(&self, kind: CallEventKind, record: &CallRecord) {
        if let Err(e) = self.events.publish(kind, record).await {
            warn!("Call {} event publish failed: {:#}", record.call_id, e);
        }
    }
}
