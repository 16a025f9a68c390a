use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::call::{
    CallId, CallKind, CallRecord, CallStatus, GroupId, MemberId, ParticipantStatus,
    RecordingState,
};
use crate::error::{CallError, CallResult};
use crate::recording::GroupPolicy;
use crate::store::{self, CallStore};

/// Invitee answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespondAction {
    Accept,
    Reject,
}

/// Result of a participant leaving
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveOutcome {
    pub call_ended: bool,
    pub record: CallRecord,
}

/// The call state machine
///
/// All status and roster changes go through here. Recording state is left
/// to the recording manager.
pub struct CallController {
    store: Arc<dyn CallStore>,
    policy: Arc<dyn GroupPolicy>,
    ring_timeout: Duration,
}

impl CallController {
    pub fn new(store: Arc<dyn CallStore>, policy: Arc<dyn GroupPolicy>, ring_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            ring_timeout,
        }
    }

    pub fn ring_timeout(&self) -> Duration {
        self.ring_timeout
    }

    pub async fn create_call(
        &self,
        group_id: GroupId,
        initiator_id: MemberId,
        invitee_ids: Vec<MemberId>,
        kind: CallKind,
    ) -> CallResult<CallRecord> {
        let unique: HashSet<&MemberId> = invitee_ids.iter().collect();
        if invitee_ids.is_empty()
            || unique.len() != invitee_ids.len()
            || unique.contains(&initiator_id)
        {
            return Err(CallError::InvalidInviteeSet);
        }

        let recording = RecordingState::new(self.policy.recording_enabled(&group_id));
        let record = CallRecord::new(group_id, initiator_id, &invitee_ids, kind, recording);
        let record = self.store.insert(record).await?;

        info!(
            "Call {} created by {} in group {} ({} invitees, {:?})",
            record.call_id,
            record.initiator_id,
            record.group_id,
            invitee_ids.len(),
            record.kind
        );
        Ok(record)
    }

    /// Accept or reject an invitation.
    ///
    /// If every invitee has rejected a ringing call, the call ends.
    pub async fn respond(
        &self,
        call_id: &CallId,
        participant_id: &MemberId,
        action: RespondAction,
    ) -> CallResult<CallRecord> {
        let record = store::mutate(&*self.store, call_id, |rec| {
            let participant = rec
                .participant_mut(participant_id)
                .ok_or_else(|| CallError::NotParticipant(participant_id.clone()))?;
            if participant.status != ParticipantStatus::Invited {
                return Err(CallError::NotInvited(participant_id.clone()));
            }

            let next = match action {
                RespondAction::Accept => ParticipantStatus::Accepted,
                RespondAction::Reject => ParticipantStatus::Rejected,
            };
            participant.advance(next);

            if rec.status == CallStatus::Ringing && rec.all_invitees_rejected() {
                rec.transition(CallStatus::Ended, Utc::now())?;
            }
            Ok(true)
        })
        .await?;

        info!(
            "Call {} participant {} responded {:?} (call {})",
            call_id, participant_id, action, record.status
        );
        Ok(record)
    }

    /// Media-transport connection signal for one participant.
    ///
    /// The participant becomes `joined`, and a ringing call becomes active
    /// once any invitee has answered. Repeated signals are no-ops.
    pub async fn connect(&self, call_id: &CallId, participant_id: &MemberId) -> CallResult<CallRecord> {
        let record = store::mutate(&*self.store, call_id, |rec| {
            if rec.status.is_terminal() {
                return Err(CallError::CallEnded(*call_id));
            }

            let participant = rec
                .participant_mut(participant_id)
                .ok_or_else(|| CallError::NotParticipant(participant_id.clone()))?;
            if matches!(
                participant.status,
                ParticipantStatus::Invited | ParticipantStatus::Rejected | ParticipantStatus::Missed
            ) {
                return Err(CallError::NotInvited(participant_id.clone()));
            }
            let mut changed = participant.advance(ParticipantStatus::Joined);

            if rec.status == CallStatus::Ringing && rec.any_invitee_answered() {
                rec.transition(CallStatus::Active, Utc::now())?;
                changed = true;
            }
            Ok(changed)
        })
        .await?;

        info!(
            "Call {} transport connected for {} (call {})",
            call_id, participant_id, record.status
        );
        Ok(record)
    }

    /// A participant leaves. The initiator leaving ends the call.
    pub async fn leave(&self, call_id: &CallId, participant_id: &MemberId) -> CallResult<LeaveOutcome> {
        let record = store::mutate(&*self.store, call_id, |rec| {
            let is_initiator = rec.is_initiator(participant_id);
            let participant = rec
                .participant_mut(participant_id)
                .ok_or_else(|| CallError::NotParticipant(participant_id.clone()))?;

            if has_departed(participant.status) {
                return Ok(false);
            }
            let mut changed = participant.advance(ParticipantStatus::Left);

            if is_initiator && !rec.status.is_terminal() {
                end_in_place(rec);
                changed = true;
            }
            Ok(changed)
        })
        .await?;

        let call_ended = record.status.is_terminal();
        info!(
            "Call {} participant {} left (call ended: {})",
            call_id, participant_id, call_ended
        );
        Ok(LeaveOutcome { call_ended, record })
    }

    /// End the call. Initiator only; ending an ended call returns it as-is.
    pub async fn end(&self, call_id: &CallId, actor_id: &MemberId) -> CallResult<CallRecord> {
        let record = store::mutate(&*self.store, call_id, |rec| {
            if !rec.is_initiator(actor_id) {
                return Err(CallError::NotInitiator(actor_id.clone()));
            }
            if rec.status.is_terminal() {
                return Ok(false);
            }
            end_in_place(rec);
            Ok(true)
        })
        .await?;

        info!(
            "Call {} ended by {} (duration {:?} ms)",
            call_id, actor_id, record.duration_ms
        );
        Ok(record)
    }

    /// Mark a call that rang past the timeout as missed.
    ///
    /// Returns the record unchanged when it is not ringing or not yet due.
    pub async fn expire(&self, call_id: &CallId) -> CallResult<CallRecord> {
        let timeout = self.ring_timeout;
        let record = store::mutate(&*self.store, call_id, |rec| {
            let now = Utc::now();
            if !rec.ring_expired(timeout, now) {
                return Ok(false);
            }
            rec.transition(CallStatus::Missed, now)?;
            rec.mark_participants(ParticipantStatus::Invited, ParticipantStatus::Missed);
            Ok(true)
        })
        .await?;

        if record.status == CallStatus::Missed {
            info!("Call {} expired as missed", call_id);
        }
        Ok(record)
    }

    /// Ringing calls that have outlived the ring timeout
    pub async fn expired_calls(&self) -> CallResult<Vec<CallId>> {
        let now = Utc::now();
        let ringing = self.store.list_by_status(CallStatus::Ringing).await?;
        Ok(ringing
            .into_iter()
            .filter(|r| r.ring_expired(self.ring_timeout, now))
            .map(|r| r.call_id)
            .collect())
    }

    pub async fn get_call(&self, call_id: &CallId) -> CallResult<CallRecord> {
        store::load(&*self.store, call_id).await
    }

    /// Open calls of a group plus calls that ended within `window`
    pub async fn poll_group(&self, group_id: &GroupId, window: Duration) -> CallResult<Vec<CallRecord>> {
        let now = Utc::now();
        let calls = self.store.list_group(group_id).await?;
        Ok(calls
            .into_iter()
            .filter(|r| r.visible_to_pollers(window, now))
            .collect())
    }
}

fn has_departed(status: ParticipantStatus) -> bool {
    matches!(
        status,
        ParticipantStatus::Left | ParticipantStatus::Rejected | ParticipantStatus::Missed
    )
}

/// Transition to `ended`: invitees still ringing missed it, everyone
/// connected has left.
fn end_in_place(rec: &mut CallRecord) {
    let now = Utc::now();
    if rec.transition(CallStatus::Ended, now).is_ok() {
        rec.mark_participants(ParticipantStatus::Invited, ParticipantStatus::Missed);
        rec.mark_participants(ParticipantStatus::Joined, ParticipantStatus::Left);
        rec.mark_participants(ParticipantStatus::Accepted, ParticipantStatus::Left);
    }
}
