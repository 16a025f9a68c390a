use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CallId, GroupId, MemberId};
use super::recording::RecordingState;
use crate::error::CallError;

/// Media kind of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Phone,
    Video,
}

/// Call status
///
/// `ringing -> active -> ended`, `ringing -> missed` and `ringing -> ended`
/// are the only reachable transitions. `ended` and `missed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Active,
    Ended,
    Missed,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Missed)
    }

    pub fn can_transition_to(self, next: CallStatus) -> bool {
        matches!(
            (self, next),
            (CallStatus::Ringing, CallStatus::Active)
                | (CallStatus::Ringing, CallStatus::Ended)
                | (CallStatus::Ringing, CallStatus::Missed)
                | (CallStatus::Active, CallStatus::Ended)
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
            CallStatus::Missed => "missed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Initiator,
    Invitee,
}

/// Participant status
///
/// Monotonic, except that `joined` and `left` may alternate while a device
/// reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Invited,
    Accepted,
    Joined,
    Rejected,
    Left,
    Missed,
}

impl ParticipantStatus {
    pub fn can_become(self, next: ParticipantStatus) -> bool {
        use ParticipantStatus::*;
        matches!(
            (self, next),
            (Invited, Accepted)
                | (Invited, Rejected)
                | (Invited, Missed)
                | (Accepted, Joined)
                | (Accepted, Left)
                | (Joined, Left)
                | (Left, Joined)
        )
    }

    /// Whether the participant has picked up at some point
    pub fn has_answered(self) -> bool {
        matches!(
            self,
            ParticipantStatus::Accepted | ParticipantStatus::Joined | ParticipantStatus::Left
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub group_member_id: MemberId,
    pub role: ParticipantRole,
    pub status: ParticipantStatus,
}

impl Participant {
    /// Move to `next`, returning whether anything changed.
    ///
    /// Re-applying the current status is a no-op.
    pub fn advance(&mut self, next: ParticipantStatus) -> bool {
        if self.status == next || !self.status.can_become(next) {
            return false;
        }
        self.status = next;
        true
    }
}

/// Authoritative server-side record of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub call_id: CallId,
    pub group_id: GroupId,
    pub kind: CallKind,
    pub status: CallStatus,
    pub initiator_id: MemberId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub participants: Vec<Participant>,
    pub recording: RecordingState,
    /// Bumped on every successful write
    #[serde(default)]
    pub version: u64,
}

impl CallRecord {
    pub fn new(
        group_id: GroupId,
        initiator_id: MemberId,
        invitee_ids: &[MemberId],
        kind: CallKind,
        recording: RecordingState,
    ) -> Self {
        let mut participants = Vec::with_capacity(invitee_ids.len() + 1);
        participants.push(Participant {
            group_member_id: initiator_id.clone(),
            role: ParticipantRole::Initiator,
            status: ParticipantStatus::Joined,
        });
        participants.extend(invitee_ids.iter().map(|id| Participant {
            group_member_id: id.clone(),
            role: ParticipantRole::Invitee,
            status: ParticipantStatus::Invited,
        }));

        Self {
            call_id: CallId::new(),
            group_id,
            kind,
            status: CallStatus::Ringing,
            initiator_id,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            duration_ms: None,
            participants,
            recording,
            version: 0,
        }
    }

    pub fn is_initiator(&self, member: &MemberId) -> bool {
        &self.initiator_id == member
    }

    pub fn participant(&self, member: &MemberId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| &p.group_member_id == member)
    }

    pub fn participant_mut(&mut self, member: &MemberId) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| &p.group_member_id == member)
    }

    pub fn invitees(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(|p| p.role == ParticipantRole::Invitee)
    }

    /// Whether any non-initiator has ever reached `accepted` or `joined`
    pub fn any_invitee_answered(&self) -> bool {
        self.invitees().any(|p| p.status.has_answered())
    }

    pub fn all_invitees_rejected(&self) -> bool {
        self.invitees()
            .all(|p| p.status == ParticipantStatus::Rejected)
    }

    /// Set every participant currently in `from` to `to`
    pub fn mark_participants(&mut self, from: ParticipantStatus, to: ParticipantStatus) {
        for p in self.participants.iter_mut().filter(|p| p.status == from) {
            p.advance(to);
        }
    }

    /// Apply a status transition, stamping timestamps.
    ///
    /// `connected_at` is set exactly once, on the first move to `active`.
    /// `duration_ms` is frozen when the call reaches a terminal state.
    pub fn transition(&mut self, next: CallStatus, now: DateTime<Utc>) -> Result<(), CallError> {
        if !self.status.can_transition_to(next) {
            return Err(CallError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next == CallStatus::Active && self.connected_at.is_none() {
            self.connected_at = Some(now);
        }
        if next.is_terminal() {
            self.ended_at = Some(now);
            self.duration_ms = self
                .connected_at
                .map(|connected| (now - connected).num_milliseconds());
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Open, or terminated no longer than `window` ago
    pub fn visible_to_pollers(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.ended_at {
            _ if self.is_open() => true,
            Some(ended_at) => now - ended_at <= window,
            None => false,
        }
    }

    /// Whether a ringing call has outlived the ring timeout
    pub fn ring_expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.status == CallStatus::Ringing && now - self.created_at >= timeout
    }
}
