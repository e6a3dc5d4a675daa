// File: src/services/config_service.rs

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ticketbot_common::error::Error;
use ticketbot_common::models::guild_config::{AUTO_CLOSE_DAYS_RANGE, MAX_TICKETS_RANGE};
use ticketbot_common::models::{ChannelSpec, GuildConfig};
use ticketbot_common::traits::{ChannelProvisioner, GuildConfigRepository};

use crate::cache::KeyedLocks;

pub const SETUP_CATEGORY_NAME: &str = "🎫 TICKETS";
pub const SETUP_LOG_CHANNEL_NAME: &str = "📋-ticket-logs";

/// One administrative edit to a guild's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigChange {
    SetCategory(String),
    SetLogChannel(String),
    AddStaffRole(String),
    AddSupportRole(String),
    RemoveRole(String),
    SetMaxTickets(u32),
    SetAutoClose { enabled: bool, days: Option<u32> },
    SetTranscripts(bool),
    SetPingStaff(bool),
    SetSlashCommands(bool),
    /// Creates a ticket category and a log channel inside it, then stores both.
    Setup,
    Reset,
    Show,
}

/// Validated read-modify-write over `GuildConfig`, serialized per guild.
pub struct GuildConfigService {
    repo: Arc<dyn GuildConfigRepository>,
    provisioner: Option<Arc<dyn ChannelProvisioner>>,
    locks: KeyedLocks,
}

impl GuildConfigService {
    pub fn new(repo: Arc<dyn GuildConfigRepository>) -> Self {
        Self {
            repo,
            provisioner: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Needed by `setup`.
    pub fn with_provisioner(mut self, provisioner: Arc<dyn ChannelProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Makes the guild known to the sweep; creates defaults if absent.
    pub async fn register_guild(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        let cfg = self.repo.get_guild_config(guild_id).await?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub async fn show(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        self.repo.get_guild_config(guild_id).await
    }

    pub async fn apply(&self, guild_id: &str, change: ConfigChange) -> Result<GuildConfig, Error> {
        match change {
            ConfigChange::SetCategory(id) => self.set_category(guild_id, &id).await,
            ConfigChange::SetLogChannel(id) => self.set_log_channel(guild_id, &id).await,
            ConfigChange::AddStaffRole(role) => self.add_staff_role(guild_id, &role).await.map(|(c, _)| c),
            ConfigChange::AddSupportRole(role) => self.add_support_role(guild_id, &role).await.map(|(c, _)| c),
            ConfigChange::RemoveRole(role) => self.remove_role(guild_id, &role).await.map(|(c, _)| c),
            ConfigChange::SetMaxTickets(n) => self.set_max_tickets(guild_id, n).await,
            ConfigChange::SetAutoClose { enabled, days } => self.set_auto_close(guild_id, enabled, days).await,
            ConfigChange::SetTranscripts(on) => self.set_transcripts(guild_id, on).await,
            ConfigChange::SetPingStaff(on) => self.set_ping_staff(guild_id, on).await,
            ConfigChange::SetSlashCommands(on) => self.set_slash_commands(guild_id, on).await,
            ConfigChange::Setup => self.setup(guild_id).await,
            ConfigChange::Reset => self.reset(guild_id).await,
            ConfigChange::Show => self.show(guild_id).await,
        }
    }

    pub async fn set_category(&self, guild_id: &str, category_id: &str) -> Result<GuildConfig, Error> {
        self.update(guild_id, |cfg| {
            cfg.ticket_category_id = Some(category_id.to_string());
            Ok(())
        })
        .await
    }

    pub async fn set_log_channel(&self, guild_id: &str, channel_id: &str) -> Result<GuildConfig, Error> {
        self.update(guild_id, |cfg| {
            cfg.log_channel_id = Some(channel_id.to_string());
            Ok(())
        })
        .await
    }

    /// Returns the config and whether the role was newly added.
    pub async fn add_staff_role(&self, guild_id: &str, role_id: &str) -> Result<(GuildConfig, bool), Error> {
        let mut added = false;
        let cfg = self
            .update(guild_id, |cfg| {
                added = insert_unique(&mut cfg.staff_roles, role_id);
                Ok(())
            })
            .await?;
        Ok((cfg, added))
    }

    pub async fn add_support_role(&self, guild_id: &str, role_id: &str) -> Result<(GuildConfig, bool), Error> {
        let mut added = false;
        let cfg = self
            .update(guild_id, |cfg| {
                added = insert_unique(&mut cfg.support_roles, role_id);
                Ok(())
            })
            .await?;
        Ok((cfg, added))
    }

    pub async fn remove_role(&self, guild_id: &str, role_id: &str) -> Result<(GuildConfig, bool), Error> {
        let mut removed = false;
        let cfg = self
            .update(guild_id, |cfg| {
                removed = cfg.remove_role(role_id);
                Ok(())
            })
            .await?;
        Ok((cfg, removed))
    }

    pub async fn set_max_tickets(&self, guild_id: &str, max: u32) -> Result<GuildConfig, Error> {
        if !MAX_TICKETS_RANGE.contains(&max) {
            return Err(Error::InvalidConfig(format!(
                "max tickets must be between {} and {}",
                MAX_TICKETS_RANGE.start(),
                MAX_TICKETS_RANGE.end()
            )));
        }
        self.update(guild_id, |cfg| {
            cfg.max_tickets_per_user = max;
            Ok(())
        })
        .await
    }

    pub async fn set_auto_close(&self, guild_id: &str, enabled: bool, days: Option<u32>) -> Result<GuildConfig, Error> {
        if let Some(d) = days {
            if !AUTO_CLOSE_DAYS_RANGE.contains(&d) {
                return Err(Error::InvalidConfig(format!(
                    "auto-close days must be between {} and {}",
                    AUTO_CLOSE_DAYS_RANGE.start(),
                    AUTO_CLOSE_DAYS_RANGE.end()
                )));
            }
        }
        self.update(guild_id, |cfg| {
            cfg.features.auto_close = enabled;
            if let Some(d) = days {
                cfg.auto_close_days = d;
            }
            Ok(())
        })
        .await
    }

    pub async fn set_transcripts(&self, guild_id: &str, enabled: bool) -> Result<GuildConfig, Error> {
        self.update(guild_id, |cfg| {
            cfg.features.transcripts = enabled;
            Ok(())
        })
        .await
    }

    pub async fn set_ping_staff(&self, guild_id: &str, enabled: bool) -> Result<GuildConfig, Error> {
        self.update(guild_id, |cfg| {
            cfg.features.ping_staff = enabled;
            Ok(())
        })
        .await
    }

    pub async fn set_slash_commands(&self, guild_id: &str, enabled: bool) -> Result<GuildConfig, Error> {
        self.update(guild_id, |cfg| {
            cfg.use_slash_commands = enabled;
            Ok(())
        })
        .await
    }

    /// Quick start: provisions a category and a log channel inside it and
    /// points the config at both. Nothing is stored if provisioning fails.
    pub async fn setup(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        let provisioner = self
            .provisioner
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("channel provisioning is unavailable".into()))?;

        let category_id = provisioner
            .create_category(guild_id, SETUP_CATEGORY_NAME)
            .await
            .map_err(|e| Error::ProvisioningFailed(format!("create ticket category: {e}")))?;

        let log_spec = ChannelSpec {
            name: SETUP_LOG_CHANNEL_NAME.to_string(),
            parent_id: Some(category_id.clone()),
            topic: "📋 Ticket activity log".to_string(),
            permissions: Vec::new(),
        };
        let log_channel_id = match provisioner.create_channel(guild_id, &log_spec).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = provisioner.delete_channel(&category_id).await {
                    warn!("removing category {} after failed setup: {:?}", category_id, cleanup);
                }
                return Err(Error::ProvisioningFailed(format!("create log channel: {e}")));
            }
        };

        let cfg = self
            .update(guild_id, |cfg| {
                cfg.ticket_category_id = Some(category_id.clone());
                cfg.log_channel_id = Some(log_channel_id.clone());
                Ok(())
            })
            .await?;
        info!(
            "setup for guild {} created category {} and log channel {}",
            guild_id, category_id, log_channel_id
        );
        Ok(cfg)
    }

    pub async fn reset(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        let _guard = self.locks.lock(guild_id).await;
        let cfg = GuildConfig::default_for(guild_id);
        self.repo.set_guild_config(guild_id, &cfg).await?;
        info!("config reset for guild {}", guild_id);
        Ok(cfg)
    }

    async fn update<F>(&self, guild_id: &str, edit: F) -> Result<GuildConfig, Error>
    where
        F: FnOnce(&mut GuildConfig) -> Result<(), Error>,
    {
        let _guard = self.locks.lock(guild_id).await;
        let mut cfg = self.repo.get_guild_config(guild_id).await?;
        edit(&mut cfg)?;
        cfg.validate()?;
        self.repo.set_guild_config(guild_id, &cfg).await?;
        info!("config updated for guild {}", guild_id);
        Ok(cfg)
    }
}

fn insert_unique(roles: &mut Vec<String>, role_id: &str) -> bool {
    if roles.iter().any(|r| r == role_id) {
        return false;
    }
    roles.push(role_id.to_string());
    true
}
