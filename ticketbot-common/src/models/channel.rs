// File: ticketbot-common/src/models/channel.rs
//
// Platform-neutral description of a ticket channel and its permission overwrites.
// The Discord adapter translates these into twilight overwrites.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelPermission {
    ViewChannel,
    SendMessages,
    ReadMessageHistory,
    ManageMessages,
    AttachFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverwriteTarget {
    Role(String),
    Member(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub target: OverwriteTarget,
    pub allow: Vec<ChannelPermission>,
    pub deny: Vec<ChannelPermission>,
}

impl PermissionGrant {
    pub fn allow(target: OverwriteTarget, perms: &[ChannelPermission]) -> Self {
        Self { target, allow: perms.to_vec(), deny: Vec::new() }
    }

    pub fn deny(target: OverwriteTarget, perms: &[ChannelPermission]) -> Self {
        Self { target, allow: Vec::new(), deny: perms.to_vec() }
    }
}

/// Everything needed to provision one ticket channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub parent_id: Option<String>,
    pub topic: String,
    pub permissions: Vec<PermissionGrant>,
}

impl ChannelSpec {
    /// The overwrite for a given target, if present.
    pub fn grant_for(&self, target: &OverwriteTarget) -> Option<&PermissionGrant> {
        self.permissions.iter().find(|g| &g.target == target)
    }
}
