// File: src/services/ticket_service.rs
//
// The ticket lifecycle engine. Every read-modify-write of a ticket runs under
// a per-ticket async mutex and re-reads the record once the lock is held.
// Events are published only after that mutex is released.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use ticketbot_common::error::Error;
use ticketbot_common::models::{
    ChannelPermission, ChannelSpec, GuildConfig, OverwriteTarget, PermissionGrant, Ticket,
    TicketFilter, TicketStats, TicketStatus, Transcript,
};
use ticketbot_common::traits::{
    ChannelProvisioner, GuildConfigRepository, TicketRepository, TranscriptRepository,
};

use crate::cache::KeyedLocks;
use crate::eventbus::{EventBus, TicketEvent, TransitionKind};
use crate::services::ticket_id::{normalize_ticket_id, TicketIdGenerator};
use crate::utils::time::{elapsed_between, format_duration};

pub const DEFAULT_CLOSE_REASON: &str = "No reason specified";

/// Timing knobs for the engine's side effects.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay before the channel of a ticket closed by command is deleted.
    pub close_grace: Duration,
    pub auto_close_grace: Duration,
    pub bulk_close_grace: Duration,
    /// Upper bound for any single platform call made after a commit.
    pub side_effect_timeout: Duration,
    pub transcript_limit: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_secs(10),
            auto_close_grace: Duration::from_secs(5),
            bulk_close_grace: Duration::from_secs(3),
            side_effect_timeout: Duration::from_secs(10),
            transcript_limit: 100,
        }
    }
}

impl EngineConfig {
    /// No grace delays; channel deletion happens inline.
    pub fn immediate() -> Self {
        Self {
            close_grace: Duration::ZERO,
            auto_close_grace: Duration::ZERO,
            bulk_close_grace: Duration::ZERO,
            side_effect_timeout: Duration::from_secs(5),
            transcript_limit: 100,
        }
    }
}

/// What happens to the channel once a close has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseMode {
    pub grace: Duration,
    pub notice: Option<String>,
    pub capture_transcript: bool,
    /// Check the channel first and skip all channel work if it is gone.
    pub check_channel: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTicketRequest {
    pub guild_id: String,
    pub author_id: String,
    pub author_tag: String,
    pub template_index: usize,
    pub reason: Option<String>,
    pub description: Option<String>,
}

pub struct TicketService {
    tickets: Arc<dyn TicketRepository>,
    configs: Arc<dyn GuildConfigRepository>,
    transcripts: Arc<dyn TranscriptRepository>,
    provisioner: Arc<dyn ChannelProvisioner>,
    id_generator: TicketIdGenerator,
    event_bus: Option<Arc<EventBus>>,
    ticket_locks: KeyedLocks,
    author_locks: KeyedLocks,
    config: EngineConfig,
}

impl TicketService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        configs: Arc<dyn GuildConfigRepository>,
        transcripts: Arc<dyn TranscriptRepository>,
        provisioner: Arc<dyn ChannelProvisioner>,
        config: EngineConfig,
    ) -> Self {
        Self {
            id_generator: TicketIdGenerator::new(tickets.clone()),
            tickets,
            configs,
            transcripts,
            provisioner,
            event_bus: None,
            ticket_locks: KeyedLocks::new(),
            author_locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn guild_config(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        self.configs.get_guild_config(guild_id).await
    }

    // ------------------------------------------------------------------
    // Close modes
    // ------------------------------------------------------------------

    pub fn command_close_mode(&self, actor_id: &str) -> CloseMode {
        CloseMode {
            grace: self.config.close_grace,
            notice: Some(format!(
                "🔒 Ticket closed by <@{}>. This channel will be deleted in {}.",
                actor_id,
                format_duration(chrono_duration(self.config.close_grace))
            )),
            capture_transcript: true,
            check_channel: false,
        }
    }

    pub fn bulk_close_mode(&self, notice: String) -> CloseMode {
        CloseMode {
            grace: self.config.bulk_close_grace,
            notice: Some(notice),
            capture_transcript: false,
            check_channel: true,
        }
    }

    pub fn auto_close_mode(&self) -> CloseMode {
        CloseMode {
            grace: self.config.auto_close_grace,
            notice: Some("🔒 Ticket closed automatically due to inactivity".to_string()),
            capture_transcript: false,
            check_channel: true,
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    pub async fn create_ticket(&self, req: CreateTicketRequest) -> Result<Ticket, Error> {
        let guild_id = req.guild_id.as_str();
        let config = self.configs.get_guild_config(guild_id).await?;

        // 1) Count check and persist are atomic per author.
        let author_guard = self
            .author_locks
            .lock(&format!("{}:{}", guild_id, req.author_id))
            .await;

        let open = self
            .tickets
            .get_all_tickets(guild_id, &TicketFilter::open_by_author(&req.author_id))
            .await?
            .len();
        if open >= config.max_tickets_per_user as usize {
            return Err(Error::LimitExceeded { open, max: config.max_tickets_per_user });
        }

        // 2) Category must exist before anything is allocated.
        let category_id = config
            .ticket_category_id
            .clone()
            .ok_or_else(|| Error::NotConfigured("ticket category is not set".into()))?;

        // 3) Allocate id and provision the channel.
        let template = config.template(req.template_index);
        let ticket_id = self.id_generator.next_id(guild_id).await?;
        let spec = ChannelSpec {
            name: channel_name(&template.emoji, &ticket_id),
            parent_id: Some(category_id),
            topic: format!("🎫 {} | 👤 {} | 🏷️ {}", ticket_id, req.author_tag, template.name),
            permissions: create_permissions(guild_id, &req.author_id, &config),
        };
        let channel_id = self
            .provisioner
            .create_channel(guild_id, &spec)
            .await
            .map_err(|e| Error::ProvisioningFailed(format!("create channel for {ticket_id}: {e}")))?;

        // 4) Persist; a failed save must not leave a live orphan channel behind.
        let mut ticket = Ticket::new_open(
            &ticket_id,
            guild_id,
            &req.author_id,
            template.type_value(),
            req.reason.clone(),
            req.description.clone(),
            Utc::now(),
        );
        ticket.channel_id = Some(channel_id.clone());
        if let Err(e) = self.tickets.save_ticket(guild_id, &ticket).await {
            error!("saving {} failed after channel {} was created: {:?}", ticket_id, channel_id, e);
            self.best_effort("delete orphan channel", self.provisioner.delete_channel(&channel_id))
                .await;
            return Err(e);
        }
        drop(author_guard);

        // 5) Welcome notice is cosmetic.
        let mentions = config
            .ping_roles()
            .iter()
            .map(|r| format!("<@&{r}>"))
            .chain(std::iter::once(format!("<@{}>", req.author_id)))
            .collect::<Vec<_>>()
            .join(" ");
        let welcome = format!(
            "{} 🎫 Ticket {} opened ({}). A staff member will be with you shortly.",
            mentions, ticket_id, template.name
        );
        self.best_effort("welcome notice", self.provisioner.send_notice(&channel_id, &welcome))
            .await;

        info!(
            "Ticket {} created in guild {} by {} (channel {})",
            ticket_id, guild_id, req.author_id, channel_id
        );
        self.publish(&ticket, TransitionKind::Created, &req.author_id).await;
        Ok(ticket)
    }

    pub async fn claim(&self, guild_id: &str, channel_id: &str, actor_id: &str) -> Result<Ticket, Error> {
        let ticket_id = self.ticket_by_channel(guild_id, channel_id).await?.ticket_id;
        let ticket = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, &ticket_id)).await;
            let mut ticket = self.reload_in_channel(guild_id, &ticket_id, channel_id).await?;

            if !ticket.is_open() {
                return Err(Error::AlreadyClosed(ticket.ticket_id));
            }
            if let Some(claimed_by) = ticket.claimed_by.clone() {
                return Err(Error::AlreadyClaimed { ticket_id: ticket.ticket_id, claimed_by });
            }

            ticket.claimed_by = Some(actor_id.to_string());
            ticket.claimed_at = Some(Utc::now());
            self.tickets.save_ticket(guild_id, &ticket).await?;
            ticket
        };

        info!("Ticket {} claimed by {} in guild {}", ticket.ticket_id, actor_id, guild_id);
        self.publish(&ticket, TransitionKind::Claimed, actor_id).await;
        Ok(ticket)
    }

    pub async fn unclaim(&self, guild_id: &str, channel_id: &str, actor_id: &str) -> Result<Ticket, Error> {
        let ticket_id = self.ticket_by_channel(guild_id, channel_id).await?.ticket_id;
        let (ticket, previous) = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, &ticket_id)).await;
            let mut ticket = self.reload_in_channel(guild_id, &ticket_id, channel_id).await?;

            let Some(previous) = ticket.claimed_by.take() else {
                return Err(Error::NotClaimed(ticket.ticket_id));
            };
            ticket.claimed_at = None;
            self.tickets.save_ticket(guild_id, &ticket).await?;
            (ticket, previous)
        };

        info!(
            "Ticket {} released by {} (was claimed by {}) in guild {}",
            ticket.ticket_id, actor_id, previous, guild_id
        );
        self.publish(&ticket, TransitionKind::Unclaimed, actor_id).await;
        Ok(ticket)
    }

    /// Close from inside the ticket channel.
    pub async fn close(
        &self,
        guild_id: &str,
        channel_id: &str,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<Ticket, Error> {
        let ticket_id = self.ticket_by_channel(guild_id, channel_id).await?.ticket_id;
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string());
        let mode = self.command_close_mode(actor_id);

        let ticket = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, &ticket_id)).await;
            let mut ticket = self.reload_in_channel(guild_id, &ticket_id, channel_id).await?;
            if !ticket.is_open() {
                return Err(Error::AlreadyClosed(ticket.ticket_id));
            }
            self.commit_close(&mut ticket, actor_id, &reason, Utc::now()).await?;
            ticket
        };

        self.publish(&ticket, TransitionKind::Closed, actor_id).await;
        self.after_close(&ticket, &mode).await;
        Ok(ticket)
    }

    /// Close addressed by ticket id, used by the bulk coordinator.
    pub async fn close_by_id(
        &self,
        guild_id: &str,
        ticket_id: &str,
        actor_id: &str,
        reason: &str,
        mode: &CloseMode,
    ) -> Result<Ticket, Error> {
        let ticket = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, ticket_id)).await;
            let mut ticket = self.load(guild_id, ticket_id).await?;
            if !ticket.is_open() {
                return Err(Error::AlreadyClosed(ticket.ticket_id));
            }
            self.commit_close(&mut ticket, actor_id, reason, Utc::now()).await?;
            ticket
        };

        self.publish(&ticket, TransitionKind::Closed, actor_id).await;
        self.after_close(&ticket, mode).await;
        Ok(ticket)
    }

    /// Closes the ticket only if, re-checked under its lock, it is still open
    /// and has been inactive for at least `threshold_days` whole days.
    /// Returns `None` when the ticket no longer qualifies.
    pub async fn close_if_inactive(
        &self,
        guild_id: &str,
        ticket_id: &str,
        actor_id: &str,
        threshold_days: u32,
        now: DateTime<Utc>,
        mode: &CloseMode,
    ) -> Result<Option<Ticket>, Error> {
        let ticket = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, ticket_id)).await;
            let mut ticket = self.load(guild_id, ticket_id).await?;
            if !ticket.is_open() {
                return Ok(None);
            }
            let days = ticket.inactive_days(now);
            if days < i64::from(threshold_days) {
                return Ok(None);
            }
            let reason = inactivity_reason(days);
            self.commit_close(&mut ticket, actor_id, &reason, now).await?;
            ticket
        };

        self.publish(&ticket, TransitionKind::Closed, actor_id).await;
        self.after_close(&ticket, mode).await;
        Ok(Some(ticket))
    }

    pub async fn reopen(
        &self,
        guild_id: &str,
        ticket_id_input: &str,
        actor_id: &str,
        actor_tag: &str,
    ) -> Result<Ticket, Error> {
        let ticket_id = normalize_ticket_id(ticket_id_input);
        let (ticket, channel_id) = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, &ticket_id)).await;

            let mut ticket = self.load(guild_id, &ticket_id).await?;
            if ticket.is_open() {
                return Err(Error::NotClosed(ticket.ticket_id));
            }

            let config = self.configs.get_guild_config(guild_id).await?;
            let spec = ChannelSpec {
                name: channel_name("🔓", &ticket.ticket_id),
                parent_id: config.ticket_category_id.clone(),
                topic: format!("🔓 {} | reopened by {}", ticket.ticket_id, actor_tag),
                permissions: reopen_permissions(guild_id, &ticket.author_id, &config),
            };
            let channel_id = self
                .provisioner
                .create_channel(guild_id, &spec)
                .await
                .map_err(|e| Error::ProvisioningFailed(format!("reopen channel for {}: {e}", ticket.ticket_id)))?;

            let now = Utc::now();
            ticket.status = TicketStatus::Open;
            ticket.channel_id = Some(channel_id.clone());
            ticket.reopened_at = Some(now);
            ticket.reopened_by = Some(actor_id.to_string());
            ticket.closed_at = None;
            ticket.closed_by = None;
            ticket.close_reason = None;
            ticket.last_activity_at = Some(now);

            if let Err(e) = self.tickets.save_ticket(guild_id, &ticket).await {
                error!("saving reopened {} failed: {:?}", ticket.ticket_id, e);
                self.best_effort("delete orphan channel", self.provisioner.delete_channel(&channel_id))
                    .await;
                return Err(e);
            }
            (ticket, channel_id)
        };

        let notice = format!(
            "<@{}> 🔓 Ticket {} was reopened by <@{}>.",
            ticket.author_id, ticket.ticket_id, actor_id
        );
        self.best_effort("reopen notice", self.provisioner.send_notice(&channel_id, &notice))
            .await;

        info!("Ticket {} reopened by {} in guild {}", ticket.ticket_id, actor_id, guild_id);
        self.publish(&ticket, TransitionKind::Reopened, actor_id).await;
        Ok(ticket)
    }

    /// Moves the ticket channel to another category. The record is unchanged.
    pub async fn transfer(
        &self,
        guild_id: &str,
        channel_id: &str,
        category_id: &str,
        actor_id: &str,
    ) -> Result<Ticket, Error> {
        let ticket_id = self.ticket_by_channel(guild_id, channel_id).await?.ticket_id;
        let ticket = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, &ticket_id)).await;
            let ticket = self.reload_in_channel(guild_id, &ticket_id, channel_id).await?;
            if !ticket.is_open() {
                return Err(Error::AlreadyClosed(ticket.ticket_id));
            }

            self.provisioner.set_channel_parent(channel_id, category_id).await?;
            ticket
        };

        info!("Ticket {} moved to category {} by {}", ticket.ticket_id, category_id, actor_id);
        self.publish(&ticket, TransitionKind::Transferred, actor_id).await;
        Ok(ticket)
    }

    pub async fn add_participant(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<(), Error> {
        self.provisioner.grant_participant(channel_id, user_id).await?;
        debug!("granted {} access to channel {}", user_id, channel_id);
        if let Some(ticket) = self.tickets.get_ticket_by_channel(guild_id, channel_id).await? {
            self.publish(&ticket, TransitionKind::ParticipantAdded, actor_id).await;
        }
        Ok(())
    }

    pub async fn remove_participant(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        actor_id: &str,
    ) -> Result<(), Error> {
        self.provisioner.revoke_participant(channel_id, user_id).await?;
        debug!("revoked {} access to channel {}", user_id, channel_id);
        if let Some(ticket) = self.tickets.get_ticket_by_channel(guild_id, channel_id).await? {
            self.publish(&ticket, TransitionKind::ParticipantRemoved, actor_id).await;
        }
        Ok(())
    }

    /// Message activity in a ticket channel. Returns true if a ticket was touched.
    pub async fn record_activity(&self, guild_id: &str, channel_id: &str) -> Result<bool, Error> {
        let Some(found) = self.tickets.get_ticket_by_channel(guild_id, channel_id).await? else {
            return Ok(false);
        };
        let _guard = self.ticket_locks.lock(&lock_key(guild_id, &found.ticket_id)).await;
        let Some(mut ticket) = self.tickets.get_ticket(guild_id, &found.ticket_id).await? else {
            return Ok(false);
        };
        if !ticket.is_open() || ticket.channel_id.as_deref() != Some(channel_id) {
            return Ok(false);
        }
        ticket.last_activity_at = Some(Utc::now());
        self.tickets.save_ticket(guild_id, &ticket).await?;
        Ok(true)
    }

    /// Removes a closed ticket's record. Not a lifecycle transition.
    pub async fn purge_closed_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<(), Error> {
        let ticket = {
            let _guard = self.ticket_locks.lock(&lock_key(guild_id, ticket_id)).await;
            let ticket = self.load(guild_id, ticket_id).await?;
            if ticket.is_open() {
                return Err(Error::NotClosed(ticket.ticket_id));
            }
            self.tickets.delete_ticket(guild_id, ticket_id).await?;
            ticket
        };
        debug!("purged closed ticket {} in guild {}", ticket_id, guild_id);
        self.publish(&ticket, TransitionKind::Purged, "system").await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn ticket_info(&self, guild_id: &str, channel_id: &str) -> Result<Ticket, Error> {
        self.ticket_by_channel(guild_id, channel_id).await
    }

    pub async fn get_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<Ticket, Error> {
        self.load(guild_id, &normalize_ticket_id(ticket_id)).await
    }

    /// Newest first.
    pub async fn list_tickets(&self, guild_id: &str, filter: &TicketFilter) -> Result<Vec<Ticket>, Error> {
        let mut tickets = self.tickets.get_all_tickets(guild_id, filter).await?;
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    pub async fn stats(&self, guild_id: &str) -> Result<TicketStats, Error> {
        self.tickets.get_stats(guild_id).await
    }

    pub async fn transcript(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Transcript>, Error> {
        self.transcripts
            .get_transcript(guild_id, &normalize_ticket_id(ticket_id))
            .await
    }

    /// Drops idle entries from the lock tables.
    pub fn prune_locks(&self) -> usize {
        self.ticket_locks.prune() + self.author_locks.prune() + self.id_generator.prune_locks()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn ticket_by_channel(&self, guild_id: &str, channel_id: &str) -> Result<Ticket, Error> {
        self.tickets
            .get_ticket_by_channel(guild_id, channel_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no ticket bound to channel {channel_id}")))
    }

    async fn load(&self, guild_id: &str, ticket_id: &str) -> Result<Ticket, Error> {
        self.tickets
            .get_ticket(guild_id, ticket_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ticket {ticket_id}")))
    }

    /// Re-read under the lock; a reopen may have moved the ticket to a new channel.
    async fn reload_in_channel(&self, guild_id: &str, ticket_id: &str, channel_id: &str) -> Result<Ticket, Error> {
        let ticket = self.load(guild_id, ticket_id).await?;
        if ticket.channel_id.as_deref() != Some(channel_id) {
            return Err(Error::NotFound(format!("no ticket bound to channel {channel_id}")));
        }
        Ok(ticket)
    }

    async fn commit_close(
        &self,
        ticket: &mut Ticket,
        actor_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        ticket.status = TicketStatus::Closed;
        ticket.closed_at = Some(now);
        ticket.closed_by = Some(actor_id.to_string());
        ticket.close_reason = Some(reason.to_string());
        ticket.claimed_by = None;
        ticket.claimed_at = None;
        self.tickets.save_ticket(&ticket.guild_id, ticket).await?;

        info!(
            "Ticket {} closed by {} in guild {} ({}), open for {}",
            ticket.ticket_id,
            actor_id,
            ticket.guild_id,
            reason,
            format_duration(elapsed_between(ticket.created_at, ticket.closed_at, now))
        );
        Ok(())
    }

    /// Post-commit channel work. Every failure is logged and swallowed.
    async fn after_close(&self, ticket: &Ticket, mode: &CloseMode) {
        let Some(channel_id) = ticket.channel_id.clone() else {
            return;
        };

        if mode.check_channel {
            match timeout(self.config.side_effect_timeout, self.provisioner.channel_exists(&channel_id)).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    info!("channel {} of {} is gone; skipping channel cleanup", channel_id, ticket.ticket_id);
                    return;
                }
                Ok(Err(e)) => {
                    warn!("could not check channel {} of {}: {:?}", channel_id, ticket.ticket_id, e);
                    return;
                }
                Err(_) => {
                    warn!("checking channel {} of {} timed out", channel_id, ticket.ticket_id);
                    return;
                }
            }
        }

        if mode.capture_transcript {
            match self.configs.get_guild_config(&ticket.guild_id).await {
                Ok(cfg) if cfg.features.transcripts => {
                    if let Err(e) = self.capture_transcript(ticket, &channel_id).await {
                        warn!("transcript for {} not saved: {:?}", ticket.ticket_id, e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("config lookup for transcript of {} failed: {:?}", ticket.ticket_id, e),
            }
        }

        if let Some(text) = &mode.notice {
            self.best_effort("closure notice", self.provisioner.send_notice(&channel_id, text))
                .await;
        }

        self.schedule_channel_deletion(channel_id, mode.grace).await;
    }

    async fn capture_transcript(&self, ticket: &Ticket, channel_id: &str) -> Result<(), Error> {
        let messages = timeout(
            self.config.side_effect_timeout,
            self.provisioner.fetch_messages(channel_id, self.config.transcript_limit),
        )
        .await??;
        let transcript = Transcript::from_messages(&ticket.guild_id, &ticket.ticket_id, messages, Utc::now());
        self.transcripts.save_transcript(&transcript).await?;
        debug!("saved transcript for {} ({} messages)", ticket.ticket_id, transcript.messages.len());
        Ok(())
    }

    async fn schedule_channel_deletion(&self, channel_id: String, grace: Duration) {
        if grace.is_zero() {
            self.best_effort("channel deletion", self.provisioner.delete_channel(&channel_id))
                .await;
            return;
        }
        let provisioner = self.provisioner.clone();
        let limit = self.config.side_effect_timeout;
        tokio::spawn(async move {
            sleep(grace).await;
            match timeout(limit, provisioner.delete_channel(&channel_id)).await {
                Ok(Ok(())) => debug!("deleted channel {}", channel_id),
                Ok(Err(e)) => warn!("deleting channel {} failed: {:?}", channel_id, e),
                Err(_) => warn!("deleting channel {} timed out", channel_id),
            }
        });
    }

    async fn best_effort<F>(&self, what: &str, fut: F)
    where
        F: Future<Output = Result<(), Error>>,
    {
        match timeout(self.config.side_effect_timeout, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} failed: {:?}", what, e),
            Err(_) => warn!("{} timed out", what),
        }
    }

    async fn publish(&self, ticket: &Ticket, kind: TransitionKind, actor_id: &str) {
        if let Some(bus) = &self.event_bus {
            bus.publish(TicketEvent::from_ticket(ticket, kind, actor_id)).await;
        }
    }
}

fn lock_key(guild_id: &str, ticket_id: &str) -> String {
    format!("{guild_id}:{ticket_id}")
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

pub fn inactivity_reason(days: i64) -> String {
    format!("inactivity ({days} days)")
}

/// `🎫-tkt-0001`
pub fn channel_name(emoji: &str, ticket_id: &str) -> String {
    format!("{}-{}", emoji, ticket_id.to_lowercase())
}

const AUTHOR_CREATE: &[ChannelPermission] = &[
    ChannelPermission::ViewChannel,
    ChannelPermission::SendMessages,
    ChannelPermission::ReadMessageHistory,
    ChannelPermission::AttachFiles,
];

const STAFF_CREATE: &[ChannelPermission] = &[
    ChannelPermission::ViewChannel,
    ChannelPermission::SendMessages,
    ChannelPermission::ReadMessageHistory,
    ChannelPermission::ManageMessages,
    ChannelPermission::AttachFiles,
];

const AUTHOR_REOPEN: &[ChannelPermission] = &[
    ChannelPermission::ViewChannel,
    ChannelPermission::SendMessages,
    ChannelPermission::ReadMessageHistory,
];

const STAFF_REOPEN: &[ChannelPermission] = &[
    ChannelPermission::ViewChannel,
    ChannelPermission::SendMessages,
    ChannelPermission::ReadMessageHistory,
    ChannelPermission::ManageMessages,
];

/// The @everyone role shares the guild's id.
fn everyone_denied(guild_id: &str) -> PermissionGrant {
    PermissionGrant::deny(
        OverwriteTarget::Role(guild_id.to_string()),
        &[ChannelPermission::ViewChannel],
    )
}

pub fn create_permissions(guild_id: &str, author_id: &str, config: &GuildConfig) -> Vec<PermissionGrant> {
    let mut grants = vec![
        everyone_denied(guild_id),
        PermissionGrant::allow(OverwriteTarget::Member(author_id.to_string()), AUTHOR_CREATE),
    ];
    grants.extend(
        config
            .create_roles()
            .into_iter()
            .map(|role| PermissionGrant::allow(OverwriteTarget::Role(role), STAFF_CREATE)),
    );
    grants
}

pub fn reopen_permissions(guild_id: &str, author_id: &str, config: &GuildConfig) -> Vec<PermissionGrant> {
    let mut grants = vec![
        everyone_denied(guild_id),
        PermissionGrant::allow(OverwriteTarget::Member(author_id.to_string()), AUTHOR_REOPEN),
    ];
    grants.extend(
        config
            .reopen_roles()
            .into_iter()
            .map(|role| PermissionGrant::allow(OverwriteTarget::Role(role), STAFF_REOPEN)),
    );
    grants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_roles() -> GuildConfig {
        let mut cfg = GuildConfig::default_for("g1");
        cfg.staff_roles = vec!["staff".into()];
        cfg.support_roles = vec!["support".into(), "staff".into()];
        cfg.admin_roles = vec!["admin".into()];
        cfg
    }

    #[test]
    fn create_permissions_hide_channel_from_everyone() {
        let grants = create_permissions("g1", "u1", &config_with_roles());
        let everyone = grants
            .iter()
            .find(|g| g.target == OverwriteTarget::Role("g1".into()))
            .unwrap();
        assert_eq!(everyone.deny, vec![ChannelPermission::ViewChannel]);
        assert!(everyone.allow.is_empty());

        let author = grants
            .iter()
            .find(|g| g.target == OverwriteTarget::Member("u1".into()))
            .unwrap();
        assert!(author.allow.contains(&ChannelPermission::AttachFiles));
        assert!(!author.allow.contains(&ChannelPermission::ManageMessages));

        // everyone + author + staff/support/admin, "staff" only once
        assert_eq!(grants.len(), 5);
    }

    #[test]
    fn reopen_permissions_exclude_admin_roles() {
        let grants = reopen_permissions("g1", "u1", &config_with_roles());
        assert!(grants.iter().all(|g| g.target != OverwriteTarget::Role("admin".into())));
        let staff = grants
            .iter()
            .find(|g| g.target == OverwriteTarget::Role("staff".into()))
            .unwrap();
        assert!(staff.allow.contains(&ChannelPermission::ManageMessages));
        assert!(!staff.allow.contains(&ChannelPermission::AttachFiles));
        assert_eq!(grants.len(), 4);
    }

    #[test]
    fn names_and_reasons() {
        assert_eq!(channel_name("🎫", "TKT-0001"), "🎫-tkt-0001");
        assert_eq!(inactivity_reason(8), "inactivity (8 days)");
    }

    #[test]
    fn immediate_config_has_no_grace() {
        let cfg = EngineConfig::immediate();
        assert!(cfg.close_grace.is_zero());
        assert_eq!(EngineConfig::default().close_grace, Duration::from_secs(10));
    }
}
