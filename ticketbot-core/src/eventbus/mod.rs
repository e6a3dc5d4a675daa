//! src/eventbus/mod.rs
//!
//! In-process event bus carrying ticket lifecycle notifications to any number
//! of subscribers via bounded MPSC queues.

pub mod log_relay;

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use ticketbot_common::models::{Ticket, TicketStatus};

/// Which transition (or administrative action) produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Created,
    Claimed,
    Unclaimed,
    Closed,
    Reopened,
    Transferred,
    ParticipantAdded,
    ParticipantRemoved,
    Purged,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Created => "ticket.created",
            TransitionKind::Claimed => "ticket.claimed",
            TransitionKind::Unclaimed => "ticket.unclaimed",
            TransitionKind::Closed => "ticket.closed",
            TransitionKind::Reopened => "ticket.reopened",
            TransitionKind::Transferred => "ticket.transferred",
            TransitionKind::ParticipantAdded => "ticket.participant_added",
            TransitionKind::ParticipantRemoved => "ticket.participant_removed",
            TransitionKind::Purged => "ticket.purged",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketEvent {
    pub event_id: Uuid,
    pub guild_id: String,
    pub ticket_id: String,
    pub actor_id: String,
    pub kind: TransitionKind,
    pub status: TicketStatus,
    pub channel_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TicketEvent {
    pub fn from_ticket(ticket: &Ticket, kind: TransitionKind, actor_id: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            guild_id: ticket.guild_id.clone(),
            ticket_id: ticket.ticket_id.clone(),
            actor_id: actor_id.to_string(),
            kind,
            status: ticket.status,
            channel_id: ticket.channel_id.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<TicketEvent>`.
///
/// - A full subscriber queue makes `publish` wait (backpressure).
/// - Subscribers whose receiver was dropped are removed on the next publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<TicketEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

pub const DEFAULT_BUFFER_SIZE: usize = 10000;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<TicketEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Publish an event to all live subscribers. No-op after shutdown.
    pub async fn publish(&self, event: TicketEvent) {
        if self.is_shutdown() {
            return;
        }
        let senders = {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|s| !s.is_closed());
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }
}
