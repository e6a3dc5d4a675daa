// File: ticketbot-common/src/models/guild_config.rs

use serde::{Deserialize, Serialize};
use crate::error::Error;

pub const MAX_TICKETS_RANGE: std::ops::RangeInclusive<u32> = 1..=10;
pub const AUTO_CLOSE_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub transcripts: bool,
    pub ping_staff: bool,
    pub auto_close: bool,
    pub stats: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            transcripts: true,
            ping_staff: true,
            auto_close: false,
            stats: true,
        }
    }
}

/// A selectable ticket type shown on the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTemplate {
    pub name: String,
    pub emoji: String,
    pub description: String,
    pub value: String,
}

impl TicketTemplate {
    pub fn general() -> Self {
        Self {
            name: "Geral".to_string(),
            emoji: "🎫".to_string(),
            description: "Suporte geral".to_string(),
            value: "general".to_string(),
        }
    }

    /// Value persisted as the ticket's `type`.
    pub fn type_value(&self) -> &str {
        if self.value.is_empty() { &self.name } else { &self.value }
    }
}

/// Per-guild configuration. Unknown/missing fields fall back to defaults on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    pub guild_id: String,
    pub features: FeatureFlags,
    pub auto_close_days: u32,
    pub max_tickets_per_user: u32,
    pub ticket_category_id: Option<String>,
    pub log_channel_id: Option<String>,
    pub staff_roles: Vec<String>,
    pub support_roles: Vec<String>,
    pub admin_roles: Vec<String>,
    pub templates: Vec<TicketTemplate>,
    pub use_slash_commands: bool,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self::default_for("")
    }
}

impl GuildConfig {
    pub fn default_for(guild_id: &str) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            features: FeatureFlags::default(),
            auto_close_days: 7,
            max_tickets_per_user: 3,
            ticket_category_id: None,
            log_channel_id: None,
            staff_roles: Vec::new(),
            support_roles: Vec::new(),
            admin_roles: Vec::new(),
            templates: vec![TicketTemplate::general()],
            use_slash_commands: true,
        }
    }

    /// Checks the structural rules once, at load or before a write.
    pub fn validate(&self) -> Result<(), Error> {
        if self.auto_close_days == 0 {
            return Err(Error::InvalidConfig("auto_close_days must be positive".into()));
        }
        if self.max_tickets_per_user == 0 {
            return Err(Error::InvalidConfig("max_tickets_per_user must be positive".into()));
        }
        if self.templates.is_empty() {
            return Err(Error::InvalidConfig("at least one ticket template is required".into()));
        }
        Ok(())
    }

    /// Template at `index`, or the built-in general template.
    pub fn template(&self, index: usize) -> TicketTemplate {
        self.templates
            .get(index)
            .cloned()
            .unwrap_or_else(TicketTemplate::general)
    }

    /// Roles that get elevated access on a freshly created ticket channel.
    pub fn create_roles(&self) -> Vec<String> {
        dedup_chain(&[&self.staff_roles, &self.support_roles, &self.admin_roles])
    }

    /// Roles that get access when a closed ticket is reopened.
    pub fn reopen_roles(&self) -> Vec<String> {
        dedup_chain(&[&self.staff_roles, &self.support_roles])
    }

    /// Roles pinged in a new ticket when `ping_staff` is on.
    pub fn ping_roles(&self) -> Vec<String> {
        if !self.features.ping_staff {
            return Vec::new();
        }
        dedup_chain(&[&self.staff_roles, &self.support_roles])
    }

    /// Removes the role from every role list; returns whether anything changed.
    pub fn remove_role(&mut self, role_id: &str) -> bool {
        let before = self.staff_roles.len() + self.support_roles.len() + self.admin_roles.len();
        self.staff_roles.retain(|r| r != role_id);
        self.support_roles.retain(|r| r != role_id);
        self.admin_roles.retain(|r| r != role_id);
        before != self.staff_roles.len() + self.support_roles.len() + self.admin_roles.len()
    }
}

fn dedup_chain(lists: &[&Vec<String>]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for list in lists {
        for role in list.iter() {
            if !out.contains(role) {
                out.push(role.clone());
            }
        }
    }
    out
}
