use std::collections::{HashMap, HashSet};

use crate::call::{GroupId, MemberId};
use crate::config::RecordingConfig;

/// Group-level recording rules supplied by group management
pub trait GroupPolicy: Send + Sync {
    fn recording_enabled(&self, group_id: &GroupId) -> bool;

    /// Whether `member` may hide or disable recordings in the group
    fn can_moderate(&self, group_id: &GroupId, member: &MemberId) -> bool;
}

/// Policy backed by static configuration
#[derive(Debug, Default, Clone)]
pub struct StaticGroupPolicy {
    disabled: HashSet<GroupId>,
    moderators: HashMap<GroupId, HashSet<MemberId>>,
}

impl StaticGroupPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        let mut policy = Self::new();
        for group in &config.disabled_groups {
            policy = policy.with_recording_disabled(group.as_str());
        }
        for (group, members) in &config.moderators {
            for member in members {
                policy = policy.with_moderator(group.as_str(), member.as_str());
            }
        }
        policy
    }

    pub fn with_recording_disabled(mut self, group_id: impl Into<GroupId>) -> Self {
        self.disabled.insert(group_id.into());
        self
    }

    pub fn with_moderator(mut self, group_id: impl Into<GroupId>, member: impl Into<MemberId>) -> Self {
        self.moderators
            .entry(group_id.into())
            .or_default()
            .insert(member.into());
        self
    }
}

impl GroupPolicy for StaticGroupPolicy {
    fn recording_enabled(&self, group_id: &GroupId) -> bool {
        !self.disabled.contains(group_id)
    }

    fn can_moderate(&self, group_id: &GroupId, member: &MemberId) -> bool {
        self.moderators
            .get(group_id)
            .is_some_and(|members| members.contains(member))
    }
}
