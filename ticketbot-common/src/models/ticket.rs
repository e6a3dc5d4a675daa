use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker stored in `closed_by` when the inactivity sweep closes a ticket.
pub const AUTO_CLOSE_ACTOR: &str = "AUTO_CLOSE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(TicketStatus::Open),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(crate::error::Error::Parse(format!("unknown ticket status '{other}'"))),
        }
    }
}

/// One support request and its lifecycle timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub guild_id: String,
    pub author_id: String,
    pub channel_id: Option<String>,
    pub status: TicketStatus,

    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    pub close_reason: Option<String>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub reopened_by: Option<String>,

    #[serde(rename = "type")]
    pub ticket_type: String,
    pub reason: Option<String>,
    pub description: Option<String>,
}

impl Ticket {
    /// A fresh open ticket with no channel yet.
    pub fn new_open(
        ticket_id: &str,
        guild_id: &str,
        author_id: &str,
        ticket_type: &str,
        reason: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            guild_id: guild_id.to_string(),
            author_id: author_id.to_string(),
            channel_id: None,
            status: TicketStatus::Open,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            last_activity_at: Some(now),
            closed_at: None,
            closed_by: None,
            close_reason: None,
            reopened_at: None,
            reopened_by: None,
            ticket_type: ticket_type.to_string(),
            reason,
            description,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    /// Last time anything happened in the ticket channel, falling back to creation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity_at.unwrap_or(self.created_at)
    }

    /// Whole days elapsed since `last_activity()`, rounded down.
    pub fn inactive_days(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_activity()).num_days()
    }

    /// `closed_at` is set iff closed, and a claim only exists while open.
    pub fn invariants_hold(&self) -> bool {
        let closed_consistent = (self.status == TicketStatus::Closed) == self.closed_at.is_some();
        let claim_consistent = self.claimed_by.is_none() || self.status == TicketStatus::Open;
        closed_consistent && claim_consistent
    }
}

/// Filter accepted by `TicketRepository::get_all_tickets`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub author_id: Option<String>,
}

impl TicketFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: TicketStatus) -> Self {
        Self { status: Some(status), author_id: None }
    }

    pub fn open_by_author(author_id: &str) -> Self {
        Self {
            status: Some(TicketStatus::Open),
            author_id: Some(author_id.to_string()),
        }
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(status) = self.status {
            if ticket.status != status {
                return false;
            }
        }
        if let Some(author) = &self.author_id {
            if &ticket.author_id != author {
                return false;
            }
        }
        true
    }
}
