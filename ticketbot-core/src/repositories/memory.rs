// src/repositories/memory.rs
//
// DashMap-backed store implementing every repository trait. Used when no
// DATABASE_URL is configured, and by the tests.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use ticketbot_common::error::Error;
use ticketbot_common::models::{GuildConfig, Ticket, TicketFilter, Transcript};
use ticketbot_common::traits::repository_traits::{
    GuildConfigRepository, TicketRepository, TranscriptRepository,
};

type GuildKey = (String, String);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tickets: DashMap<GuildKey, Ticket>,
    counters: DashMap<String, u64>,
    configs: DashMap<String, GuildConfig>,
    transcripts: DashMap<GuildKey, Transcript>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    /// Test hook: write a record without going through the engine.
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.tickets
            .insert((ticket.guild_id.clone(), ticket.ticket_id.clone()), ticket);
    }

    fn key(guild_id: &str, id: &str) -> GuildKey {
        (guild_id.to_string(), id.to_string())
    }
}

#[async_trait]
impl TicketRepository for InMemoryStore {
    async fn get_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Ticket>, Error> {
        Ok(self.tickets.get(&Self::key(guild_id, ticket_id)).map(|t| t.clone()))
    }

    async fn get_ticket_by_channel(&self, guild_id: &str, channel_id: &str) -> Result<Option<Ticket>, Error> {
        Ok(self
            .tickets
            .iter()
            .find(|e| e.key().0 == guild_id && e.value().channel_id.as_deref() == Some(channel_id))
            .map(|e| e.value().clone()))
    }

    async fn save_ticket(&self, guild_id: &str, ticket: &Ticket) -> Result<(), Error> {
        self.tickets
            .insert(Self::key(guild_id, &ticket.ticket_id), ticket.clone());
        Ok(())
    }

    async fn delete_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<(), Error> {
        self.tickets.remove(&Self::key(guild_id, ticket_id));
        Ok(())
    }

    async fn get_all_tickets(&self, guild_id: &str, filter: &TicketFilter) -> Result<Vec<Ticket>, Error> {
        let mut out: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|e| e.key().0 == guild_id && filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.ticket_id.cmp(&b.ticket_id)));
        Ok(out)
    }

    async fn next_ticket_sequence(&self, guild_id: &str) -> Result<u64, Error> {
        let mut entry = self.counters.entry(guild_id.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }
}

#[async_trait]
impl GuildConfigRepository for InMemoryStore {
    async fn get_guild_config(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        let cfg = self
            .configs
            .entry(guild_id.to_string())
            .or_insert_with(|| {
                debug!("created default config for guild {}", guild_id);
                GuildConfig::default_for(guild_id)
            })
            .clone();
        Ok(cfg)
    }

    async fn set_guild_config(&self, guild_id: &str, config: &GuildConfig) -> Result<(), Error> {
        let mut cfg = config.clone();
        cfg.guild_id = guild_id.to_string();
        self.configs.insert(guild_id.to_string(), cfg);
        Ok(())
    }

    async fn list_guild_ids(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self.configs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl TranscriptRepository for InMemoryStore {
    async fn save_transcript(&self, transcript: &Transcript) -> Result<(), Error> {
        self.transcripts.insert(
            Self::key(&transcript.guild_id, &transcript.ticket_id),
            transcript.clone(),
        );
        Ok(())
    }

    async fn get_transcript(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Transcript>, Error> {
        Ok(self.transcripts.get(&Self::key(guild_id, ticket_id)).map(|t| t.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ticketbot_common::models::TicketStatus;

    #[tokio::test]
    async fn counter_never_goes_backwards() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_ticket_sequence("g").await.unwrap(), 1);
        assert_eq!(store.next_ticket_sequence("g").await.unwrap(), 2);
        assert_eq!(store.next_ticket_sequence("other").await.unwrap(), 1);

        let t = Ticket::new_open("TKT-0002", "g", "u", "general", None, None, Utc::now());
        store.save_ticket("g", &t).await.unwrap();
        store.delete_ticket("g", "TKT-0002").await.unwrap();
        assert_eq!(store.next_ticket_sequence("g").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn config_defaults_are_created_on_first_access() {
        let store = InMemoryStore::new();
        assert!(store.list_guild_ids().await.unwrap().is_empty());
        let cfg = store.get_guild_config("g").await.unwrap();
        assert_eq!(cfg.max_tickets_per_user, 3);
        assert_eq!(store.list_guild_ids().await.unwrap(), vec!["g".to_string()]);
    }

    #[tokio::test]
    async fn filter_by_status_and_channel_lookup() {
        let store = InMemoryStore::new();
        let mut open = Ticket::new_open("TKT-0001", "g", "u", "general", None, None, Utc::now());
        open.channel_id = Some("c1".into());
        let mut closed = Ticket::new_open("TKT-0002", "g", "u", "general", None, None, Utc::now());
        closed.status = TicketStatus::Closed;
        closed.closed_at = Some(Utc::now());
        store.save_ticket("g", &open).await.unwrap();
        store.save_ticket("g", &closed).await.unwrap();

        let only_open = store
            .get_all_tickets("g", &TicketFilter::with_status(TicketStatus::Open))
            .await
            .unwrap();
        assert_eq!(only_open.len(), 1);
        assert_eq!(
            store.get_ticket_by_channel("g", "c1").await.unwrap().unwrap().ticket_id,
            "TKT-0001"
        );
        assert!(store.get_ticket_by_channel("other", "c1").await.unwrap().is_none());
    }
}
