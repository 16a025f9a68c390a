use crate::call::{CallId, CallRecord, CallStatus, Participant, RecordingStatus, Segment};

/// A difference between the device's view and the server record
#[derive(Debug, Clone, PartialEq)]
pub enum CallChange {
    /// The call moved to a non-terminal status
    StatusChanged {
        from: Option<CallStatus>,
        to: CallStatus,
    },
    /// The call ended or was missed; local capture and transport must stop
    Terminated(CallStatus),
    /// Segments the device has not seen yet, in `chunkIndex` order
    SegmentsAppended(Vec<Segment>),
    RecordingStatusChanged {
        from: Option<RecordingStatus>,
        to: RecordingStatus,
    },
    ParticipantsChanged(Vec<Participant>),
    /// The call no longer shows up in group polls
    Vanished,
}

/// Device-local cache of one call
///
/// Reconciliation is a plain diff where the server record always wins.
#[derive(Debug, Clone)]
pub struct LocalCallView {
    call_id: CallId,
    record: Option<CallRecord>,
    vanished: bool,
}

impl LocalCallView {
    pub fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            record: None,
            vanished: false,
        }
    }

    /// Start from a record the device already holds (e.g. from create/join)
    pub fn seeded(record: CallRecord) -> Self {
        Self {
            call_id: record.call_id,
            record: Some(record),
            vanished: false,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn record(&self) -> Option<&CallRecord> {
        self.record.as_ref()
    }

    pub fn status(&self) -> Option<CallStatus> {
        self.record.as_ref().map(|r| r.status)
    }

    pub fn recording_status(&self) -> Option<RecordingStatus> {
        self.record.as_ref().map(|r| r.recording.status)
    }

    pub fn segments(&self) -> &[Segment] {
        self.record
            .as_ref()
            .map(|r| r.recording.segments.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the device should stop tracking the call
    pub fn is_closed(&self) -> bool {
        self.vanished || self.status().is_some_and(CallStatus::is_terminal)
    }

    /// Diff `server` against the cached record and adopt it
    pub fn reconcile(&mut self, server: &CallRecord) -> Vec<CallChange> {
        let mut changes = Vec::new();
        let local = self.record.as_ref();

        if local.map(|r| r.version) == Some(server.version) && local == Some(server) {
            return changes;
        }

        if local.map(|r| &r.participants) != Some(&server.participants) {
            changes.push(CallChange::ParticipantsChanged(server.participants.clone()));
        }

        let local_recording = local.map(|r| r.recording.status);
        if local_recording != Some(server.recording.status) {
            changes.push(CallChange::RecordingStatusChanged {
                from: local_recording,
                to: server.recording.status,
            });
        }

        let known = local
            .map(|r| r.recording.segments.len())
            .unwrap_or(0);
        let mut fresh: Vec<Segment> = server
            .recording
            .segments
            .iter()
            .filter(|s| s.chunk_index as usize >= known)
            .cloned()
            .collect();
        if !fresh.is_empty() {
            fresh.sort_by_key(|s| s.chunk_index);
            changes.push(CallChange::SegmentsAppended(fresh));
        }

        let local_status = local.map(|r| r.status);
        if local_status != Some(server.status) {
            if server.status.is_terminal() {
                changes.push(CallChange::Terminated(server.status));
            } else {
                changes.push(CallChange::StatusChanged {
                    from: local_status,
                    to: server.status,
                });
            }
        }

        self.record = Some(server.clone());
        changes
    }

    /// The call disappeared from a successful poll
    pub fn mark_vanished(&mut self) -> Vec<CallChange> {
        if self.is_closed() {
            return Vec::new();
        }
        self.vanished = true;
        vec![CallChange::Vanished]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallKind, ChunkId, GroupId, MemberId, RecordingState};
    use chrono::Utc;

    fn record() -> CallRecord {
        CallRecord::new(
            GroupId::from("g"),
            MemberId::from("a"),
            &[MemberId::from("b")],
            CallKind::Phone,
            RecordingState::new(true),
        )
    }

    fn segment(index: u32) -> Segment {
        Segment {
            chunk_id: ChunkId::new(),
            chunk_index: index,
            file_url: format!("/media/{}.wav", index),
            duration_ms: 1000,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_identical_record_yields_no_changes() {
        let server = record();
        let mut view = LocalCallView::seeded(server.clone());
        assert!(view.reconcile(&server).is_empty());
    }

    #[test]
    fn test_first_reconcile_reports_everything() {
        let server = record();
        let mut view = LocalCallView::new(server.call_id);
        let changes = view.reconcile(&server);
        assert!(changes.contains(&CallChange::StatusChanged {
            from: None,
            to: CallStatus::Ringing
        }));
        assert_eq!(view.status(), Some(CallStatus::Ringing));
    }

    #[test]
    fn test_only_unseen_segments_are_reported() {
        let mut server = record();
        server.recording.status = RecordingStatus::Recording;
        server.recording.segments = vec![segment(0)];
        let mut view = LocalCallView::seeded(server.clone());

        server.recording.segments.push(segment(1));
        server.recording.segments.push(segment(2));
        server.version += 1;

        let changes = view.reconcile(&server);
        let appended = changes
            .iter()
            .find_map(|c| match c {
                CallChange::SegmentsAppended(s) => Some(s),
                _ => None,
            })
            .unwrap();
        let indices: Vec<u32> = appended.iter().map(|s| s.chunk_index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(view.segments().len(), 3);
    }

    #[test]
    fn test_remote_end_is_terminal() {
        let mut server = record();
        let mut view = LocalCallView::seeded(server.clone());
        server.status = CallStatus::Ended;
        server.version += 1;

        let changes = view.reconcile(&server);
        assert!(changes.contains(&CallChange::Terminated(CallStatus::Ended)));
        assert!(view.is_closed());
    }

    #[test]
    fn test_recording_disabled_remotely_is_reflected() {
        let mut server = record();
        server.recording.status = RecordingStatus::Recording;
        let mut view = LocalCallView::seeded(server.clone());
        server.recording.status = RecordingStatus::Disabled;
        server.version += 1;

        let changes = view.reconcile(&server);
        assert_eq!(
            changes,
            vec![CallChange::RecordingStatusChanged {
                from: Some(RecordingStatus::Recording),
                to: RecordingStatus::Disabled
            }]
        );
    }

    #[test]
    fn test_vanished_only_once() {
        let mut view = LocalCallView::seeded(record());
        assert_eq!(view.mark_vanished(), vec![CallChange::Vanished]);
        assert!(view.mark_vanished().is_empty());
    }
}
