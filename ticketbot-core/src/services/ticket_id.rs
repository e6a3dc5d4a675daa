// File: src/services/ticket_id.rs

use std::sync::Arc;
use tracing::debug;
use ticketbot_common::error::Error;
use ticketbot_common::traits::TicketRepository;
use crate::cache::KeyedLocks;

pub const TICKET_ID_PREFIX: &str = "TKT-";

/// `TKT-0001`. Sequences above 9999 just widen.
pub fn format_ticket_id(sequence: u64) -> String {
    format!("{TICKET_ID_PREFIX}{sequence:04}")
}

/// User input is matched case-insensitively against stored ids.
pub fn normalize_ticket_id(input: &str) -> String {
    input.trim().to_uppercase()
}

pub fn parse_ticket_sequence(ticket_id: &str) -> Option<u64> {
    normalize_ticket_id(ticket_id)
        .strip_prefix(TICKET_ID_PREFIX)
        .and_then(|digits| digits.parse::<u64>().ok())
}

/// Allocates ticket ids from the repository's per-guild counter.
pub struct TicketIdGenerator {
    repo: Arc<dyn TicketRepository>,
    guild_locks: KeyedLocks,
}

impl TicketIdGenerator {
    pub fn new(repo: Arc<dyn TicketRepository>) -> Self {
        Self {
            repo,
            guild_locks: KeyedLocks::new(),
        }
    }

    pub async fn next_id(&self, guild_id: &str) -> Result<String, Error> {
        // The repository increment is atomic already; this just keeps one
        // allocation in flight per guild.
        let _guard = self.guild_locks.lock(guild_id).await;
        let seq = self.repo.next_ticket_sequence(guild_id).await?;
        let id = format_ticket_id(seq);
        debug!("allocated {} for guild {}", id, guild_id);
        Ok(id)
    }

    pub fn prune_locks(&self) -> usize {
        self.guild_locks.prune()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_four_digits() {
        assert_eq!(format_ticket_id(1), "TKT-0001");
        assert_eq!(format_ticket_id(42), "TKT-0042");
        assert_eq!(format_ticket_id(12345), "TKT-12345");
    }

    #[test]
    fn normalizes_and_parses() {
        assert_eq!(normalize_ticket_id("  tkt-0007 "), "TKT-0007");
        assert_eq!(parse_ticket_sequence("tkt-0007"), Some(7));
        assert_eq!(parse_ticket_sequence("ABC-1"), None);
        assert_eq!(parse_ticket_sequence("TKT-"), None);
    }
}
