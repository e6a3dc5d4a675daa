use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message captured from a ticket channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub id: String,
    pub author_id: String,
    pub author_tag: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub ticket_id: String,
    pub guild_id: String,
    pub text: String,
    pub messages: Vec<TranscriptMessage>,
    pub created_at: DateTime<Utc>,
}

impl Transcript {
    /// Builds a transcript from messages in any order; output is chronological.
    pub fn from_messages(
        guild_id: &str,
        ticket_id: &str,
        mut messages: Vec<TranscriptMessage>,
        now: DateTime<Utc>,
    ) -> Self {
        messages.sort_by_key(|m| m.timestamp);
        let text = messages
            .iter()
            .map(|m| format!("[{}] {}: {}", m.timestamp.to_rfc3339(), m.author_tag, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            ticket_id: ticket_id.to_string(),
            guild_id: guild_id.to_string(),
            text,
            messages,
            created_at: now,
        }
    }
}
