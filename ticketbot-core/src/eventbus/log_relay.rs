//! src/eventbus/log_relay.rs
//!
//! Subscribes to the EventBus and mirrors every lifecycle event to the
//! guild's configured log channel. Guilds without a log channel only get a
//! tracing line.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ticketbot_common::traits::{ChannelProvisioner, GuildConfigRepository};

use crate::eventbus::{EventBus, TicketEvent, TransitionKind};

/// Human-readable line posted to the log channel.
pub fn format_log_line(event: &TicketEvent) -> String {
    let (emoji, verb) = match event.kind {
        TransitionKind::Created => ("🎫", "opened"),
        TransitionKind::Claimed => ("🙋", "claimed"),
        TransitionKind::Unclaimed => ("↩️", "released"),
        TransitionKind::Closed => ("🔒", "closed"),
        TransitionKind::Reopened => ("🔓", "reopened"),
        TransitionKind::Transferred => ("📦", "transferred"),
        TransitionKind::ParticipantAdded => ("➕", "gained a participant"),
        TransitionKind::ParticipantRemoved => ("➖", "lost a participant"),
        TransitionKind::Purged => ("🗑️", "deleted"),
    };
    let by = if event.actor_id.chars().all(|c| c.is_ascii_digit()) {
        format!("<@{}>", event.actor_id)
    } else {
        event.actor_id.clone()
    };
    match &event.channel_id {
        Some(channel) if event.kind != TransitionKind::Purged => {
            format!("{emoji} {} {verb} by {by} (<#{channel}>)", event.ticket_id)
        }
        _ => format!("{emoji} {} {verb} by {by}", event.ticket_id),
    }
}

/// Spawns the relay. The subscription is registered before this returns,
/// so no event published afterwards is missed.
pub async fn spawn_log_relay_task(
    event_bus: &EventBus,
    configs: Arc<dyn GuildConfigRepository>,
    provisioner: Arc<dyn ChannelProvisioner>,
    buffer_size: usize,
) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(Some(buffer_size)).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("ticket log relay started");
        loop {
            tokio::select! {
                biased;
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else {
                        debug!("log relay channel closed");
                        break;
                    };
                    info!(
                        "[{}] guild={} ticket={} actor={} status={}",
                        event.kind, event.guild_id, event.ticket_id, event.actor_id, event.status
                    );
                    relay(&*configs, &*provisioner, &event).await;
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("ticket log relay shutting down");
                        break;
                    }
                }
            }
        }
    })
}

async fn relay(configs: &dyn GuildConfigRepository, provisioner: &dyn ChannelProvisioner, event: &TicketEvent) {
    let cfg = match configs.get_guild_config(&event.guild_id).await {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("log relay: config for guild {} unavailable: {:?}", event.guild_id, e);
            return;
        }
    };
    let Some(log_channel) = cfg.log_channel_id else {
        return;
    };
    if let Err(e) = provisioner.send_notice(&log_channel, &format_log_line(event)).await {
        warn!("log relay: posting to channel {} failed: {:?}", log_channel, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ticketbot_common::models::{Ticket, AUTO_CLOSE_ACTOR};

    fn event(kind: TransitionKind, actor: &str) -> TicketEvent {
        let mut ticket = Ticket::new_open("TKT-0007", "g1", "u1", "general", None, None, Utc::now());
        ticket.channel_id = Some("555".into());
        TicketEvent::from_ticket(&ticket, kind, actor)
    }

    #[test]
    fn mentions_numeric_actors_only() {
        assert_eq!(
            format_log_line(&event(TransitionKind::Claimed, "42")),
            "🙋 TKT-0007 claimed by <@42> (<#555>)"
        );
        assert_eq!(
            format_log_line(&event(TransitionKind::Closed, AUTO_CLOSE_ACTOR)),
            "🔒 TKT-0007 closed by AUTO_CLOSE (<#555>)"
        );
    }

    #[test]
    fn purge_omits_channel() {
        assert_eq!(
            format_log_line(&event(TransitionKind::Purged, "system")),
            "🗑️ TKT-0007 deleted by system"
        );
    }
}
