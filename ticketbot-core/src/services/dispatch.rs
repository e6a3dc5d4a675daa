// File: src/services/dispatch.rs
//
// Inbound requests pass through admission (slash toggle, rate limit) before
// reaching a registered handler. Handler errors are classified here so the
// platform layer only ever sees a `DispatchOutcome`.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use ticketbot_common::error::Error;
use ticketbot_common::models::{GuildConfig, Ticket, TicketFilter, TicketStats, TicketStatus};
use ticketbot_common::traits::GuildConfigRepository;

use crate::cache::{RateLimitPolicy, RateLimiter};
use crate::services::bulk_actions::{BulkActionService, BulkReport};
use crate::services::config_service::{ConfigChange, GuildConfigService};
use crate::services::ticket_service::{CreateTicketRequest, TicketService};

pub const TICKET_COMMAND: &str = "ticket";
pub const ACTIONS_COMMAND: &str = "actions";
pub const CONFIG_COMMAND: &str = "config";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    Create {
        template_index: usize,
        reason: Option<String>,
        description: Option<String>,
    },
    Close { reason: Option<String> },
    Reopen { ticket_id: String },
    Claim,
    Unclaim,
    AddParticipant { user_id: String },
    RemoveParticipant { user_id: String },
    Transfer { category_id: String },
    Info,
    List { status: Option<TicketStatus> },
    Stats,
    CloseAllOpen,
    DeleteClosed,
    CloseInactive { days: u32 },
    Configure(ConfigChange),
}

impl TicketAction {
    /// The top-level command this action belongs to; also the rate-limit scope.
    pub fn command_name(&self) -> &'static str {
        match self {
            TicketAction::CloseAllOpen
            | TicketAction::DeleteClosed
            | TicketAction::CloseInactive { .. } => ACTIONS_COMMAND,
            TicketAction::Configure(_) => CONFIG_COMMAND,
            _ => TICKET_COMMAND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestSource {
    SlashCommand,
    Button,
    ModalSubmit,
}

#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub guild_id: String,
    pub channel_id: Option<String>,
    pub actor_id: String,
    pub actor_tag: String,
    pub source: RequestSource,
    pub action: TicketAction,
}

impl InboundRequest {
    fn require_channel(&self) -> Result<&str, Error> {
        self.channel_id
            .as_deref()
            .ok_or_else(|| Error::NotFound("this action must be used inside a ticket channel".into()))
    }
}

#[derive(Debug, Clone)]
pub enum ActionResult {
    Ticket(Ticket),
    Tickets(Vec<Ticket>),
    Stats(TicketStats),
    Bulk(BulkReport),
    Config(GuildConfig),
    ParticipantAdded { user_id: String },
    ParticipantRemoved { user_id: String },
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(ActionResult),
    RateLimited,
    SlashCommandsDisabled,
    /// A precondition or validation failure the user can act on.
    Rejected(Error),
    /// Unexpected failure, already logged.
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed(_))
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, request: &InboundRequest) -> Result<ActionResult, Error>;
}

pub struct TicketCommandHandler {
    tickets: Arc<TicketService>,
}

impl TicketCommandHandler {
    pub fn new(tickets: Arc<TicketService>) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl CommandHandler for TicketCommandHandler {
    fn name(&self) -> &'static str {
        TICKET_COMMAND
    }

    async fn handle(&self, req: &InboundRequest) -> Result<ActionResult, Error> {
        let guild = req.guild_id.as_str();
        let actor = req.actor_id.as_str();
        match &req.action {
            TicketAction::Create { template_index, reason, description } => {
                let ticket = self
                    .tickets
                    .create_ticket(CreateTicketRequest {
                        guild_id: req.guild_id.clone(),
                        author_id: req.actor_id.clone(),
                        author_tag: req.actor_tag.clone(),
                        template_index: *template_index,
                        reason: reason.clone(),
                        description: description.clone(),
                    })
                    .await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::Close { reason } => {
                let channel = req.require_channel()?;
                let ticket = self.tickets.close(guild, channel, actor, reason.clone()).await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::Reopen { ticket_id } => {
                let ticket = self.tickets.reopen(guild, ticket_id, actor, &req.actor_tag).await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::Claim => {
                let ticket = self.tickets.claim(guild, req.require_channel()?, actor).await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::Unclaim => {
                let ticket = self.tickets.unclaim(guild, req.require_channel()?, actor).await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::AddParticipant { user_id } => {
                self.tickets
                    .add_participant(guild, req.require_channel()?, user_id, actor)
                    .await?;
                Ok(ActionResult::ParticipantAdded { user_id: user_id.clone() })
            }
            TicketAction::RemoveParticipant { user_id } => {
                self.tickets
                    .remove_participant(guild, req.require_channel()?, user_id, actor)
                    .await?;
                Ok(ActionResult::ParticipantRemoved { user_id: user_id.clone() })
            }
            TicketAction::Transfer { category_id } => {
                let ticket = self
                    .tickets
                    .transfer(guild, req.require_channel()?, category_id, actor)
                    .await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::Info => {
                let ticket = self.tickets.ticket_info(guild, req.require_channel()?).await?;
                Ok(ActionResult::Ticket(ticket))
            }
            TicketAction::List { status } => {
                let filter = TicketFilter { status: *status, author_id: None };
                Ok(ActionResult::Tickets(self.tickets.list_tickets(guild, &filter).await?))
            }
            TicketAction::Stats => {
                let cfg = self.tickets.guild_config(guild).await?;
                if !cfg.features.stats {
                    return Err(Error::NotConfigured("statistics are disabled for this server".into()));
                }
                Ok(ActionResult::Stats(self.tickets.stats(guild).await?))
            }
            other => Err(Error::Platform(format!("{:?} is not a ticket action", other))),
        }
    }
}

pub struct BulkCommandHandler {
    bulk: Arc<BulkActionService>,
}

impl BulkCommandHandler {
    pub fn new(bulk: Arc<BulkActionService>) -> Self {
        Self { bulk }
    }
}

#[async_trait]
impl CommandHandler for BulkCommandHandler {
    fn name(&self) -> &'static str {
        ACTIONS_COMMAND
    }

    async fn handle(&self, req: &InboundRequest) -> Result<ActionResult, Error> {
        let report = match &req.action {
            TicketAction::CloseAllOpen => self.bulk.close_all_open(&req.guild_id, &req.actor_id).await?,
            TicketAction::DeleteClosed => self.bulk.delete_closed(&req.guild_id).await?,
            TicketAction::CloseInactive { days } => {
                if *days == 0 {
                    return Err(Error::InvalidConfig("days must be at least 1".into()));
                }
                self.bulk.close_inactive(&req.guild_id, *days, &req.actor_id).await?
            }
            other => return Err(Error::Platform(format!("{:?} is not a bulk action", other))),
        };
        Ok(ActionResult::Bulk(report))
    }
}

pub struct ConfigCommandHandler {
    configs: Arc<GuildConfigService>,
}

impl ConfigCommandHandler {
    pub fn new(configs: Arc<GuildConfigService>) -> Self {
        Self { configs }
    }
}

#[async_trait]
impl CommandHandler for ConfigCommandHandler {
    fn name(&self) -> &'static str {
        CONFIG_COMMAND
    }

    async fn handle(&self, req: &InboundRequest) -> Result<ActionResult, Error> {
        match &req.action {
            TicketAction::Configure(change) => {
                let cfg = self.configs.apply(&req.guild_id, change.clone()).await?;
                Ok(ActionResult::Config(cfg))
            }
            other => Err(Error::Platform(format!("{:?} is not a config action", other))),
        }
    }
}

/// Command name -> handler. Built once at startup.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// The three handlers the bot ships with.
    pub fn standard(
        tickets: Arc<TicketService>,
        bulk: Arc<BulkActionService>,
        configs: Arc<GuildConfigService>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TicketCommandHandler::new(tickets)));
        registry.register(Arc::new(BulkCommandHandler::new(bulk)));
        registry.register(Arc::new(ConfigCommandHandler::new(configs)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

pub struct Dispatcher {
    registry: CommandRegistry,
    limiter: Arc<RateLimiter>,
    policy: RateLimitPolicy,
    configs: Arc<dyn GuildConfigRepository>,
}

impl Dispatcher {
    pub fn new(
        registry: CommandRegistry,
        limiter: Arc<RateLimiter>,
        policy: RateLimitPolicy,
        configs: Arc<dyn GuildConfigRepository>,
    ) -> Self {
        Self { registry, limiter, policy, configs }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn dispatch(&self, request: InboundRequest) -> DispatchOutcome {
        let command = request.action.command_name();

        // 1) Slash commands can be switched off per guild; /config stays usable.
        if request.source == RequestSource::SlashCommand && command != CONFIG_COMMAND {
            match self.configs.get_guild_config(&request.guild_id).await {
                Ok(cfg) if !cfg.use_slash_commands => return DispatchOutcome::SlashCommandsDisabled,
                Ok(_) => {}
                Err(e) => {
                    error!("loading config for guild {} failed: {:?}", request.guild_id, e);
                    return DispatchOutcome::Failed(e.to_string());
                }
            }
        }

        // 2) Admission.
        let key = RateLimiter::key(&request.guild_id, &request.actor_id, command);
        if !self.limiter.check_policy(&key, &self.policy) {
            warn!("rate limited: {}", key);
            return DispatchOutcome::RateLimited;
        }

        // 3) Handler.
        let Some(handler) = self.registry.get(command) else {
            error!("no handler registered for '{}'", command);
            return DispatchOutcome::Failed(format!("no handler registered for '{command}'"));
        };

        match handler.handle(&request).await {
            Ok(result) => {
                debug!("{} by {} in guild {} completed", command, request.actor_id, request.guild_id);
                DispatchOutcome::Completed(result)
            }
            Err(e) if e.is_precondition() || matches!(e, Error::InvalidConfig(_)) => {
                debug!("{} by {} rejected: {}", command, request.actor_id, e);
                DispatchOutcome::Rejected(e)
            }
            Err(e) => {
                error!(
                    "{} ({:?}) by {} in guild {} failed: {:?}",
                    command, request.action, request.actor_id, request.guild_id, e
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_commands() {
        assert_eq!(TicketAction::Claim.command_name(), TICKET_COMMAND);
        assert_eq!(TicketAction::Stats.command_name(), TICKET_COMMAND);
        assert_eq!(TicketAction::CloseInactive { days: 3 }.command_name(), ACTIONS_COMMAND);
        assert_eq!(TicketAction::Configure(ConfigChange::Show).command_name(), CONFIG_COMMAND);
    }
}
