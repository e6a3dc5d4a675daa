// File: ticketbot-core/src/platforms/discord/interactions.rs
//
// Translates Discord interactions into dispatcher actions and dispatch
// outcomes into plain-text replies. Everything here is pure except the
// twilight conversion helpers.

use std::collections::HashMap;
use twilight_model::application::interaction::application_command::{
    CommandData, CommandDataOption, CommandOptionValue,
};
use twilight_model::application::interaction::modal::ModalInteractionData;

use ticketbot_common::error::Error;
use ticketbot_common::models::{Ticket, TicketStatus};

use crate::services::bulk_actions::BulkReport;
use crate::services::config_service::ConfigChange;
use crate::services::dispatch::{ActionResult, DispatchOutcome, TicketAction};
use crate::utils::time::format_duration;

pub const BUTTON_CLOSE: &str = "ticket_close";
pub const BUTTON_CLAIM: &str = "ticket_claim";
pub const MODAL_PREFIX: &str = "ticket_modal:";
pub const FIELD_REASON: &str = "ticket_reason";
pub const FIELD_DESCRIPTION: &str = "ticket_description";

/// How many tickets a list reply shows.
const LIST_LIMIT: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    /// User, channel or role snowflake.
    Id(String),
}

/// A slash command flattened to `name [subcommand] options`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInput {
    pub name: String,
    pub subcommand: Option<String>,
    pub options: HashMap<String, OptionValue>,
}

impl CommandInput {
    pub fn new(name: &str, subcommand: &str) -> Self {
        Self {
            name: name.to_string(),
            subcommand: Some(subcommand.to_string()),
            options: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: OptionValue) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.options.get(key) {
            Some(OptionValue::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn id(&self, key: &str) -> Result<String, Error> {
        match self.options.get(key) {
            Some(OptionValue::Id(s)) => Ok(s.clone()),
            _ => Err(Error::Parse(format!("missing option '{key}'"))),
        }
    }

    fn integer(&self, key: &str) -> Option<i64> {
        match self.options.get(key) {
            Some(OptionValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    fn boolean(&self, key: &str) -> Result<bool, Error> {
        match self.options.get(key) {
            Some(OptionValue::Boolean(b)) => Ok(*b),
            _ => Err(Error::Parse(format!("missing option '{key}'"))),
        }
    }

    fn non_negative(&self, key: &str) -> Result<Option<u32>, Error> {
        self.integer(key)
            .map(|i| u32::try_from(i).map_err(|_| Error::Parse(format!("option '{key}' out of range"))))
            .transpose()
    }
}

pub fn command_input_from(data: &CommandData) -> CommandInput {
    let mut input = CommandInput {
        name: data.name.clone(),
        ..Default::default()
    };
    collect_options(&data.options, &mut input);
    input
}

fn collect_options(options: &[CommandDataOption], input: &mut CommandInput) {
    for opt in options {
        let value = match &opt.value {
            CommandOptionValue::SubCommand(nested) | CommandOptionValue::SubCommandGroup(nested) => {
                input.subcommand = Some(opt.name.clone());
                collect_options(nested, input);
                continue;
            }
            CommandOptionValue::String(s) => OptionValue::String(s.clone()),
            CommandOptionValue::Integer(i) => OptionValue::Integer(*i),
            CommandOptionValue::Boolean(b) => OptionValue::Boolean(*b),
            CommandOptionValue::User(id) => OptionValue::Id(id.to_string()),
            CommandOptionValue::Channel(id) => OptionValue::Id(id.to_string()),
            CommandOptionValue::Role(id) => OptionValue::Id(id.to_string()),
            CommandOptionValue::Mentionable(id) => OptionValue::Id(id.to_string()),
            _ => continue,
        };
        input.options.insert(opt.name.clone(), value);
    }
}

pub fn modal_fields_from(data: &ModalInteractionData) -> HashMap<String, String> {
    data.components
        .iter()
        .flat_map(|row| row.components.iter())
        .filter_map(|c| c.value.clone().map(|v| (c.custom_id.clone(), v)))
        .collect()
}

pub fn parse_command(input: &CommandInput) -> Result<TicketAction, Error> {
    let sub = input.subcommand.as_deref().unwrap_or_default();
    let unknown = || Error::Parse(format!("unknown command /{} {}", input.name, sub));

    let action = match input.name.as_str() {
        "ticket" => match sub {
            "create" => TicketAction::Create {
                template_index: input.non_negative("template")?.unwrap_or(0) as usize,
                reason: input.string("reason"),
                description: input.string("description"),
            },
            "close" => TicketAction::Close { reason: input.string("reason") },
            "reopen" => TicketAction::Reopen {
                ticket_id: input
                    .string("id")
                    .ok_or_else(|| Error::Parse("missing option 'id'".into()))?,
            },
            "claim" => TicketAction::Claim,
            "unclaim" => TicketAction::Unclaim,
            "add" => TicketAction::AddParticipant { user_id: input.id("user")? },
            "remove" => TicketAction::RemoveParticipant { user_id: input.id("user")? },
            "transfer" => TicketAction::Transfer { category_id: input.id("category")? },
            "info" => TicketAction::Info,
            "list" => TicketAction::List {
                status: input.string("status").map(|s| s.parse::<TicketStatus>()).transpose()?,
            },
            "stats" => TicketAction::Stats,
            _ => return Err(unknown()),
        },
        "actions" => match sub {
            "close-all" => TicketAction::CloseAllOpen,
            "delete-closed" => TicketAction::DeleteClosed,
            "close-inactive" => TicketAction::CloseInactive {
                days: input
                    .non_negative("days")?
                    .ok_or_else(|| Error::Parse("missing option 'days'".into()))?,
            },
            _ => return Err(unknown()),
        },
        "config" => TicketAction::Configure(match sub {
            "category" => ConfigChange::SetCategory(input.id("category")?),
            "logs" => ConfigChange::SetLogChannel(input.id("channel")?),
            "staff-role" => ConfigChange::AddStaffRole(input.id("role")?),
            "support-role" => ConfigChange::AddSupportRole(input.id("role")?),
            "remove-role" => ConfigChange::RemoveRole(input.id("role")?),
            "max-tickets" => ConfigChange::SetMaxTickets(
                input
                    .non_negative("value")?
                    .ok_or_else(|| Error::Parse("missing option 'value'".into()))?,
            ),
            "auto-close" => ConfigChange::SetAutoClose {
                enabled: input.boolean("enabled")?,
                days: input.non_negative("days")?,
            },
            "transcripts" => ConfigChange::SetTranscripts(input.boolean("enabled")?),
            "ping-staff" => ConfigChange::SetPingStaff(input.boolean("enabled")?),
            "slash-commands" => ConfigChange::SetSlashCommands(input.boolean("enabled")?),
            "show" => ConfigChange::Show,
            "setup" => ConfigChange::Setup,
            "reset" => ConfigChange::Reset,
            _ => return Err(unknown()),
        }),
        _ => return Err(unknown()),
    };
    Ok(action)
}

/// Buttons attached to ticket messages.
pub fn parse_component(custom_id: &str) -> Option<TicketAction> {
    match custom_id {
        BUTTON_CLOSE => Some(TicketAction::Close { reason: None }),
        BUTTON_CLAIM => Some(TicketAction::Claim),
        _ => None,
    }
}

/// `ticket_modal:<template index>` with optional reason/description fields.
pub fn parse_modal(custom_id: &str, fields: &HashMap<String, String>) -> Option<TicketAction> {
    let index = custom_id.strip_prefix(MODAL_PREFIX)?.parse::<usize>().ok()?;
    let field = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Some(TicketAction::Create {
        template_index: index,
        reason: field(FIELD_REASON),
        description: field(FIELD_DESCRIPTION),
    })
}

pub fn describe_outcome(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Completed(result) => describe_result(result),
        DispatchOutcome::RateLimited => "⏳ You're doing that too often. Try again in a minute.".to_string(),
        DispatchOutcome::SlashCommandsDisabled => {
            "⚠️ Slash commands are disabled on this server.".to_string()
        }
        DispatchOutcome::Rejected(e) => format!("❌ {}", describe_error(e)),
        DispatchOutcome::Failed(_) => "❌ Something went wrong. Please try again later.".to_string(),
    }
}

fn describe_error(e: &Error) -> String {
    match e {
        Error::NotFound(_) => "This is not a ticket channel, or the ticket does not exist.".to_string(),
        Error::AlreadyClosed(id) => format!("Ticket {id} is already closed."),
        Error::AlreadyClaimed { claimed_by, .. } => format!("This ticket was already claimed by <@{claimed_by}>."),
        Error::NotClaimed(id) => format!("Ticket {id} is not claimed."),
        Error::NotClosed(id) => format!("Ticket {id} is not closed."),
        Error::LimitExceeded { open, max } => {
            format!("You already have {open} open ticket(s); the limit is {max}.")
        }
        Error::NotConfigured(what) => format!("This server is not configured yet: {what}."),
        Error::InvalidConfig(what) => format!("Invalid value: {what}."),
        other => other.to_string(),
    }
}

fn describe_result(result: &ActionResult) -> String {
    match result {
        ActionResult::Ticket(t) => describe_ticket(t),
        ActionResult::Tickets(list) => describe_list(list),
        ActionResult::Stats(s) => {
            let mut out = format!(
                "📊 Total {} | 🟢 Open {} | 🔴 Closed {} | 👤 Claimed {} | 📅 Today {} | 📆 Week {} | ⏱️ Avg {}min",
                s.total, s.open, s.closed, s.claimed, s.today, s.week, s.avg_response_minutes
            );
            for (kind, count) in &s.by_type {
                out.push_str(&format!("\n🏷️ {kind}: {count}"));
            }
            out
        }
        ActionResult::Bulk(report) => describe_bulk(report),
        ActionResult::Config(cfg) => format!(
            "⚙️ category: {} | logs: {} | max tickets: {} | auto-close: {} ({} days) | transcripts: {} | ping staff: {} | slash commands: {}\nstaff roles: {} | support roles: {}",
            cfg.ticket_category_id.as_deref().map(|c| format!("<#{c}>")).unwrap_or_else(|| "not set".into()),
            cfg.log_channel_id.as_deref().map(|c| format!("<#{c}>")).unwrap_or_else(|| "not set".into()),
            cfg.max_tickets_per_user,
            on_off(cfg.features.auto_close),
            cfg.auto_close_days,
            on_off(cfg.features.transcripts),
            on_off(cfg.features.ping_staff),
            on_off(cfg.use_slash_commands),
            mention_roles(&cfg.staff_roles),
            mention_roles(&cfg.support_roles),
        ),
        ActionResult::ParticipantAdded { user_id } => format!("➕ <@{user_id}> was added to the ticket."),
        ActionResult::ParticipantRemoved { user_id } => format!("➖ <@{user_id}> was removed from the ticket."),
    }
}

fn describe_ticket(t: &Ticket) -> String {
    let status = match t.status {
        TicketStatus::Open => "🟢 open",
        TicketStatus::Closed => "🔴 closed",
    };
    let mut out = format!("🎫 **{}** ({}) by <@{}> | {}", t.ticket_id, t.ticket_type, t.author_id, status);
    if let Some(channel) = &t.channel_id {
        if t.is_open() {
            out.push_str(&format!(" | <#{channel}>"));
        }
    }
    if let Some(by) = &t.claimed_by {
        out.push_str(&format!(" | 👤 claimed by <@{by}>"));
    }
    if let (Some(by), Some(reason)) = (&t.closed_by, &t.close_reason) {
        out.push_str(&format!(" | 🔒 closed by {by}: {reason}"));
    }
    let elapsed = t.closed_at.unwrap_or_else(chrono::Utc::now) - t.created_at;
    out.push_str(&format!(" | ⏱️ {}", format_duration(elapsed)));
    out
}

fn describe_list(list: &[Ticket]) -> String {
    if list.is_empty() {
        return "📋 No tickets found.".to_string();
    }
    let mut lines: Vec<String> = list
        .iter()
        .take(LIST_LIMIT)
        .map(|t| {
            let dot = if t.is_open() { "🟢" } else { "🔴" };
            let claimed = t
                .claimed_by
                .as_deref()
                .map(|c| format!(" 👤 <@{c}>"))
                .unwrap_or_default();
            format!("{dot} **{}** - <@{}>{claimed}", t.ticket_id, t.author_id)
        })
        .collect();
    if list.len() > LIST_LIMIT {
        lines.push(format!("Showing {} of {} tickets", LIST_LIMIT, list.len()));
    }
    lines.join("\n")
}

fn describe_bulk(report: &BulkReport) -> String {
    if report.attempted == 0 {
        return "ℹ️ No matching tickets found.".to_string();
    }
    let mut out = format!("✅ {} of {} ticket(s) processed.", report.succeeded, report.attempted);
    if report.failed > 0 {
        out.push_str(&format!(" {} failed.", report.failed));
    }
    out
}

fn on_off(b: bool) -> &'static str {
    if b { "on" } else { "off" }
}

fn mention_roles(roles: &[String]) -> String {
    if roles.is_empty() {
        return "none".to_string();
    }
    roles.iter().map(|r| format!("<@&{r}>")).collect::<Vec<_>>().join(" ")
}
