use async_trait::async_trait;
use chrono::Utc;

use crate::error::Error;
use crate::models::{GuildConfig, Ticket, TicketFilter, TicketStats, Transcript};

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn get_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Ticket>, Error>;
    async fn get_ticket_by_channel(&self, guild_id: &str, channel_id: &str) -> Result<Option<Ticket>, Error>;

    /// Insert or replace the record keyed by `(guild_id, ticket_id)`.
    async fn save_ticket(&self, guild_id: &str, ticket: &Ticket) -> Result<(), Error>;
    async fn delete_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<(), Error>;
    async fn get_all_tickets(&self, guild_id: &str, filter: &TicketFilter) -> Result<Vec<Ticket>, Error>;

    /// Atomically increments and returns the guild's ticket counter.
    /// The counter never goes backwards, even when tickets are deleted.
    async fn next_ticket_sequence(&self, guild_id: &str) -> Result<u64, Error>;

    async fn get_stats(&self, guild_id: &str) -> Result<TicketStats, Error> {
        let tickets = self.get_all_tickets(guild_id, &TicketFilter::all()).await?;
        Ok(TicketStats::from_tickets(&tickets, Utc::now()))
    }
}

#[async_trait]
pub trait GuildConfigRepository: Send + Sync {
    /// Returns the stored config, creating and storing defaults on first access.
    async fn get_guild_config(&self, guild_id: &str) -> Result<GuildConfig, Error>;
    async fn set_guild_config(&self, guild_id: &str, config: &GuildConfig) -> Result<(), Error>;

    /// Every guild that has a stored config.
    async fn list_guild_ids(&self) -> Result<Vec<String>, Error>;
}

#[async_trait]
pub trait TranscriptRepository: Send + Sync {
    async fn save_transcript(&self, transcript: &Transcript) -> Result<(), Error>;
    async fn get_transcript(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Transcript>, Error>;
}
