// File: ticketbot-core/src/platforms/discord/commands.rs
//
// Slash command declarations for /ticket, /actions and /config.
// Option names must match what `interactions::parse_command` reads.

use std::sync::Arc;
use twilight_http::Client as HttpClient;
use twilight_model::application::command::{Command, CommandType};
use twilight_model::channel::ChannelType;
use twilight_model::guild::Permissions;
use twilight_model::id::marker::ApplicationMarker;
use twilight_model::id::Id;
use twilight_util::builder::command::{
    BooleanBuilder, ChannelBuilder, CommandBuilder, IntegerBuilder, RoleBuilder, StringBuilder,
    SubCommandBuilder, UserBuilder,
};

use ticketbot_common::error::Error;

fn ticket_command() -> Command {
    CommandBuilder::new("ticket", "Support tickets", CommandType::ChatInput)
        .dm_permission(false)
        .option(
            SubCommandBuilder::new("create", "Open a new ticket")
                .option(IntegerBuilder::new("template", "Ticket type (template number)").min_value(0))
                .option(StringBuilder::new("reason", "Short reason").max_length(100))
                .option(StringBuilder::new("description", "Describe the problem").max_length(1000)),
        )
        .option(
            SubCommandBuilder::new("close", "Close this ticket")
                .option(StringBuilder::new("reason", "Why the ticket is being closed")),
        )
        .option(
            SubCommandBuilder::new("reopen", "Reopen a closed ticket")
                .option(StringBuilder::new("id", "Ticket id, e.g. TKT-0001").required(true)),
        )
        .option(SubCommandBuilder::new("claim", "Take ownership of this ticket"))
        .option(SubCommandBuilder::new("unclaim", "Release this ticket"))
        .option(
            SubCommandBuilder::new("add", "Add a user to this ticket")
                .option(UserBuilder::new("user", "User to add").required(true)),
        )
        .option(
            SubCommandBuilder::new("remove", "Remove a user from this ticket")
                .option(UserBuilder::new("user", "User to remove").required(true)),
        )
        .option(
            SubCommandBuilder::new("transfer", "Move this ticket to another category").option(
                ChannelBuilder::new("category", "Target category")
                    .channel_types([ChannelType::GuildCategory])
                    .required(true),
            ),
        )
        .option(SubCommandBuilder::new("info", "Show details of this ticket"))
        .option(
            SubCommandBuilder::new("list", "List tickets")
                .option(StringBuilder::new("status", "open or closed").choices([("open", "open"), ("closed", "closed")])),
        )
        .option(SubCommandBuilder::new("stats", "Ticket statistics"))
        .build()
}

fn actions_command() -> Command {
    CommandBuilder::new("actions", "Bulk ticket maintenance", CommandType::ChatInput)
        .dm_permission(false)
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .option(SubCommandBuilder::new("close-all", "Close every open ticket"))
        .option(SubCommandBuilder::new("delete-closed", "Delete every closed ticket record"))
        .option(
            SubCommandBuilder::new("close-inactive", "Close tickets without recent activity").option(
                IntegerBuilder::new("days", "Days without activity")
                    .min_value(1)
                    .max_value(365)
                    .required(true),
            ),
        )
        .build()
}

fn config_command() -> Command {
    let toggle = |name: &'static str, description: &'static str| {
        SubCommandBuilder::new(name, description)
            .option(BooleanBuilder::new("enabled", "On or off").required(true))
    };

    CommandBuilder::new("config", "Ticket system configuration", CommandType::ChatInput)
        .dm_permission(false)
        .default_member_permissions(Permissions::ADMINISTRATOR)
        .option(
            SubCommandBuilder::new("category", "Category for new tickets").option(
                ChannelBuilder::new("category", "Category")
                    .channel_types([ChannelType::GuildCategory])
                    .required(true),
            ),
        )
        .option(
            SubCommandBuilder::new("logs", "Log channel").option(
                ChannelBuilder::new("channel", "Channel")
                    .channel_types([ChannelType::GuildText])
                    .required(true),
            ),
        )
        .option(
            SubCommandBuilder::new("staff-role", "Add a staff role")
                .option(RoleBuilder::new("role", "Role").required(true)),
        )
        .option(
            SubCommandBuilder::new("support-role", "Add a support role")
                .option(RoleBuilder::new("role", "Role").required(true)),
        )
        .option(
            SubCommandBuilder::new("remove-role", "Remove a staff/support role")
                .option(RoleBuilder::new("role", "Role").required(true)),
        )
        .option(
            SubCommandBuilder::new("max-tickets", "Open tickets allowed per user").option(
                IntegerBuilder::new("value", "1 to 10")
                    .min_value(1)
                    .max_value(10)
                    .required(true),
            ),
        )
        .option(
            toggle("auto-close", "Close inactive tickets automatically")
                .option(IntegerBuilder::new("days", "1 to 30").min_value(1).max_value(30)),
        )
        .option(toggle("transcripts", "Save transcripts on close"))
        .option(toggle("ping-staff", "Mention staff on new tickets"))
        .option(toggle("slash-commands", "Allow slash commands"))
        .option(SubCommandBuilder::new("setup", "Create a ticket category and log channel"))
        .option(SubCommandBuilder::new("show", "Show the current configuration"))
        .option(SubCommandBuilder::new("reset", "Restore defaults"))
        .build()
}

pub fn command_definitions() -> Vec<Command> {
    vec![ticket_command(), actions_command(), config_command()]
}

pub async fn register_global_commands(
    http: &Arc<HttpClient>,
    application_id: Id<ApplicationMarker>,
) -> Result<(), Error> {
    let commands = command_definitions();
    http.interaction(application_id)
        .set_global_commands(&commands)
        .await
        .map_err(|e| Error::Platform(format!("Failed to register global slash commands: {e}")))?;
    Ok(())
}
