// File: ticketbot-core/src/platforms/discord/runtime.rs
//
// Gateway loop: interactions go to the dispatcher, guild messages bump ticket
// activity, guild create/ready register guilds for the auto-close sweep.
// Parsed interactions are acknowledged with an ephemeral deferral before the
// dispatcher runs, then the deferred reply is edited with the outcome.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use twilight_gateway::{Event, EventTypeFlags, Shard, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::channel::message::MessageFlags;
use twilight_model::gateway::payload::incoming::MessageCreate;
use twilight_model::http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType};
use twilight_model::id::marker::ApplicationMarker;
use twilight_model::id::Id;

use ticketbot_common::error::Error;

use crate::services::config_service::GuildConfigService;
use crate::services::dispatch::{Dispatcher, InboundRequest, RequestSource};
use crate::services::ticket_service::TicketService;
use crate::platforms::discord::interactions::{
    command_input_from, describe_outcome, modal_fields_from, parse_command, parse_component,
    parse_modal,
};

pub struct DiscordRuntime {
    http: Arc<HttpClient>,
    application_id: Id<ApplicationMarker>,
    dispatcher: Arc<Dispatcher>,
    tickets: Arc<TicketService>,
    configs: Arc<GuildConfigService>,
}

impl DiscordRuntime {
    pub fn new(
        http: Arc<HttpClient>,
        application_id: Id<ApplicationMarker>,
        dispatcher: Arc<Dispatcher>,
        tickets: Arc<TicketService>,
        configs: Arc<GuildConfigService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            http,
            application_id,
            dispatcher,
            tickets,
            configs,
        })
    }

    /// Runs until the gateway stream ends or `shutdown_rx` flips to true.
    /// Each inbound event is handled on its own task.
    pub async fn run(self: Arc<Self>, mut shard: Shard, mut shutdown_rx: watch::Receiver<bool>) {
        let shard_id = shard.id().number();
        info!("(ShardRunner) Shard {shard_id} started. Listening for events.");

        loop {
            let item = tokio::select! {
                item = shard.next_event(EventTypeFlags::all()) => item,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shard {shard_id} => shutdown requested");
                        break;
                    }
                    continue;
                }
            };

            let Some(item) = item else { break };
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    error!("Shard {shard_id} => error receiving event: {err:?}");
                    continue;
                }
            };

            match event {
                Event::Ready(ready) => {
                    info!("Shard {shard_id} => READY as {} (ID={})", ready.user.name, ready.user.id);
                    for guild in &ready.guilds {
                        self.spawn_register(guild.id.to_string());
                    }
                }
                Event::GuildCreate(guild) => {
                    self.spawn_register(guild.id().to_string());
                }
                Event::MessageCreate(msg) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.on_message(&msg).await });
                }
                Event::InteractionCreate(interaction) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = this.on_interaction(&interaction.0).await {
                            error!("interaction {} failed: {:?}", interaction.0.id, e);
                        }
                    });
                }
                other => {
                    trace!("Shard {shard_id} => unhandled event: {:?}", other.kind());
                }
            }
        }

        warn!("(ShardRunner) Shard {shard_id} event loop ended.");
    }

    fn spawn_register(self: &Arc<Self>, guild_id: String) {
        let configs = self.configs.clone();
        tokio::spawn(async move {
            match configs.register_guild(&guild_id).await {
                Ok(_) => debug!("registered guild {}", guild_id),
                Err(e) => error!("registering guild {} failed: {:?}", guild_id, e),
            }
        });
    }

    async fn on_message(&self, msg: &MessageCreate) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else { return };
        match self
            .tickets
            .record_activity(&guild_id.to_string(), &msg.channel_id.to_string())
            .await
        {
            Ok(true) => trace!("activity recorded in channel {}", msg.channel_id),
            Ok(false) => {}
            Err(e) => warn!("recording activity in channel {} failed: {:?}", msg.channel_id, e),
        }
    }

    async fn on_interaction(&self, interaction: &Interaction) -> Result<(), Error> {
        let Some(guild_id) = interaction.guild_id else {
            return self.reply(interaction, "❌ Tickets only work inside a server.").await;
        };
        let Some(user) = interaction.author() else {
            return Ok(());
        };

        let parsed = match &interaction.data {
            Some(InteractionData::ApplicationCommand(data)) => {
                Some(parse_command(&command_input_from(data)).map(|a| (a, RequestSource::SlashCommand)))
            }
            Some(InteractionData::MessageComponent(data)) => {
                parse_component(&data.custom_id).map(|a| Ok((a, RequestSource::Button)))
            }
            Some(InteractionData::ModalSubmit(data)) => {
                parse_modal(&data.custom_id, &modal_fields_from(data)).map(|a| Ok((a, RequestSource::ModalSubmit)))
            }
            _ => None,
        };

        let (action, source) = match parsed {
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                debug!("unparseable interaction {}: {}", interaction.id, e);
                return self.reply(interaction, &format!("❌ {e}")).await;
            }
            None => return Ok(()),
        };

        let request = InboundRequest {
            guild_id: guild_id.to_string(),
            channel_id: interaction.channel.as_ref().map(|c| c.id.to_string()),
            actor_id: user.id.to_string(),
            actor_tag: user.name.clone(),
            source,
            action,
        };

        // Channel provisioning can outlast the interaction's acknowledgement window.
        self.respond(interaction, &deferred_response()).await?;
        let outcome = self.dispatcher.dispatch(request).await;
        self.edit_reply(interaction, &describe_outcome(&outcome)).await
    }

    /// Immediate answer for interactions that never reach the dispatcher.
    async fn reply(&self, interaction: &Interaction, content: &str) -> Result<(), Error> {
        self.respond(interaction, &ephemeral_message(content)).await
    }

    async fn respond(&self, interaction: &Interaction, response: &InteractionResponse) -> Result<(), Error> {
        self.http
            .interaction(self.application_id)
            .create_response(interaction.id, &interaction.token, response)
            .await
            .map_err(|e| Error::Platform(format!("Error responding to interaction: {e}")))?;
        Ok(())
    }

    async fn edit_reply(&self, interaction: &Interaction, content: &str) -> Result<(), Error> {
        self.http
            .interaction(self.application_id)
            .update_response(&interaction.token)
            .content(Some(content))
            .await
            .map_err(|e| Error::Platform(format!("Error editing interaction reply: {e}")))?;
        Ok(())
    }
}

fn ephemeral_message(content: &str) -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::ChannelMessageWithSource,
        data: Some(InteractionResponseData {
            content: Some(content.to_string()),
            flags: Some(MessageFlags::EPHEMERAL),
            ..Default::default()
        }),
    }
}

/// "Thinking..." placeholder, visible only to the invoking user.
fn deferred_response() -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::DeferredChannelMessageWithSource,
        data: Some(InteractionResponseData {
            flags: Some(MessageFlags::EPHEMERAL),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferral_is_ephemeral_and_has_no_content() {
        let response = deferred_response();
        assert_eq!(response.kind, InteractionResponseType::DeferredChannelMessageWithSource);
        let data = response.data.expect("deferral carries flags");
        assert_eq!(data.flags, Some(MessageFlags::EPHEMERAL));
        assert!(data.content.is_none());
    }

    #[test]
    fn immediate_replies_are_ephemeral_messages() {
        let response = ephemeral_message("❌ nope");
        assert_eq!(response.kind, InteractionResponseType::ChannelMessageWithSource);
        let data = response.data.expect("message has data");
        assert_eq!(data.content.as_deref(), Some("❌ nope"));
        assert_eq!(data.flags, Some(MessageFlags::EPHEMERAL));
    }
}
