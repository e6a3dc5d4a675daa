// File: ticketbot-core/src/test_utils/helpers.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use tokio::sync::Mutex;

use ticketbot_common::error::Error;
use ticketbot_common::models::{
    ChannelSpec, GuildConfig, Ticket, TicketFilter, TicketStatus, TranscriptMessage,
};
use ticketbot_common::traits::{ChannelProvisioner, GuildConfigRepository, TicketRepository};

use crate::cache::{RateLimitPolicy, RateLimiter};
use crate::db::Database;
use crate::eventbus::EventBus;
use crate::repositories::memory::InMemoryStore;
use crate::services::bulk_actions::BulkActionService;
use crate::services::config_service::GuildConfigService;
use crate::services::dispatch::{CommandRegistry, Dispatcher};
use crate::services::ticket_service::{CreateTicketRequest, EngineConfig, TicketService};

pub const TEST_GUILD: &str = "100";
pub const TEST_CATEGORY: &str = "900";
pub const TEST_STAFF_ROLE: &str = "800";

/// Every call the fake provisioner receives, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    Create { guild_id: String, name: String, parent_id: Option<String> },
    CreateCategory { guild_id: String, name: String },
    Delete(String),
    SetParent { channel_id: String, category_id: String },
    Grant { channel_id: String, user_id: String },
    Revoke { channel_id: String, user_id: String },
    Exists(String),
    Fetch(String),
    Notice { channel_id: String, text: String },
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    channels: HashMap<String, ChannelSpec>,
    deleted: Vec<String>,
    calls: Vec<ProvisionCall>,
    messages: HashMap<String, Vec<TranscriptMessage>>,
    fail_create: bool,
    fail_notices: bool,
    failing_channels: HashSet<String>,
    hung_channels: HashSet<String>,
    categories: HashSet<String>,
}

/// In-memory stand-in for the Discord channel API.
#[derive(Default)]
pub struct FakeProvisioner {
    state: Mutex<FakeState>,
    create_delay: Option<Duration>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create_channel` sleeps first, widening race windows in tests.
    pub fn with_create_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            create_delay: Some(delay),
        }
    }

    pub async fn set_fail_create(&self, fail: bool) {
        self.state.lock().await.fail_create = fail;
    }

    pub async fn set_fail_notices(&self, fail: bool) {
        self.state.lock().await.fail_notices = fail;
    }

    /// Every call touching this channel fails with a platform error.
    pub async fn break_channel(&self, channel_id: &str) {
        self.state.lock().await.failing_channels.insert(channel_id.to_string());
    }

    /// Existence checks, notices and deletes on this channel never complete.
    pub async fn hang_channel(&self, channel_id: &str) {
        self.state.lock().await.hung_channels.insert(channel_id.to_string());
    }

    pub async fn is_category(&self, channel_id: &str) -> bool {
        self.state.lock().await.categories.contains(channel_id)
    }

    /// Simulates a channel deleted by hand on the platform.
    pub async fn remove_channel(&self, channel_id: &str) {
        self.state.lock().await.channels.remove(channel_id);
    }

    /// Messages are returned as given; pass them newest first.
    pub async fn seed_messages(&self, channel_id: &str, messages: Vec<TranscriptMessage>) {
        self.state
            .lock()
            .await
            .messages
            .insert(channel_id.to_string(), messages);
    }

    pub async fn created_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, ProvisionCall::Create { .. }))
            .count()
    }

    pub async fn spec_of(&self, channel_id: &str) -> Option<ChannelSpec> {
        self.state.lock().await.channels.get(channel_id).cloned()
    }

    pub async fn is_live(&self, channel_id: &str) -> bool {
        self.state.lock().await.channels.contains_key(channel_id)
    }

    pub async fn is_deleted(&self, channel_id: &str) -> bool {
        self.state.lock().await.deleted.iter().any(|c| c == channel_id)
    }

    pub async fn calls(&self) -> Vec<ProvisionCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn notices_for(&self, channel_id: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                ProvisionCall::Notice { channel_id: ch, text } if ch == channel_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Records the call; if the channel is hung, the lock is released and the
    /// caller waits forever.
    async fn record(&self, call: ProvisionCall, channel_id: &str) {
        let hung = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            state.hung_channels.contains(channel_id)
        };
        if hung {
            std::future::pending::<()>().await;
        }
    }

    fn check_channel(state: &FakeState, channel_id: &str) -> Result<(), Error> {
        if state.failing_channels.contains(channel_id) {
            return Err(Error::Platform(format!("simulated failure on channel {channel_id}")));
        }
        Ok(())
    }

    fn require_live(state: &FakeState, channel_id: &str) -> Result<(), Error> {
        Self::check_channel(state, channel_id)?;
        if !state.channels.contains_key(channel_id) {
            return Err(Error::NotFound(format!("channel {channel_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelProvisioner for FakeProvisioner {
    async fn create_channel(&self, guild_id: &str, spec: &ChannelSpec) -> Result<String, Error> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        state.calls.push(ProvisionCall::Create {
            guild_id: guild_id.to_string(),
            name: spec.name.clone(),
            parent_id: spec.parent_id.clone(),
        });
        if state.fail_create {
            return Err(Error::Platform("simulated channel creation failure".into()));
        }
        state.next_id += 1;
        let id = (5000 + state.next_id).to_string();
        state.channels.insert(id.clone(), spec.clone());
        Ok(id)
    }

    async fn create_category(&self, guild_id: &str, name: &str) -> Result<String, Error> {
        let mut state = self.state.lock().await;
        state.calls.push(ProvisionCall::CreateCategory {
            guild_id: guild_id.to_string(),
            name: name.to_string(),
        });
        if state.fail_create {
            return Err(Error::Platform("simulated category creation failure".into()));
        }
        state.next_id += 1;
        let id = (5000 + state.next_id).to_string();
        state.channels.insert(
            id.clone(),
            ChannelSpec {
                name: name.to_string(),
                parent_id: None,
                topic: String::new(),
                permissions: Vec::new(),
            },
        );
        state.categories.insert(id.clone());
        Ok(id)
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), Error> {
        self.record(ProvisionCall::Delete(channel_id.to_string()), channel_id).await;
        let mut state = self.state.lock().await;
        Self::check_channel(&state, channel_id)?;
        state.channels.remove(channel_id);
        state.deleted.push(channel_id.to_string());
        Ok(())
    }

    async fn set_channel_parent(&self, channel_id: &str, category_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.calls.push(ProvisionCall::SetParent {
            channel_id: channel_id.to_string(),
            category_id: category_id.to_string(),
        });
        Self::require_live(&state, channel_id)?;
        if let Some(spec) = state.channels.get_mut(channel_id) {
            spec.parent_id = Some(category_id.to_string());
        }
        Ok(())
    }

    async fn grant_participant(&self, channel_id: &str, user_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.calls.push(ProvisionCall::Grant {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
        });
        Self::require_live(&state, channel_id)
    }

    async fn revoke_participant(&self, channel_id: &str, user_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.calls.push(ProvisionCall::Revoke {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
        });
        Self::require_live(&state, channel_id)
    }

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, Error> {
        self.record(ProvisionCall::Exists(channel_id.to_string()), channel_id).await;
        let state = self.state.lock().await;
        Self::check_channel(&state, channel_id)?;
        Ok(state.channels.contains_key(channel_id))
    }

    async fn fetch_messages(&self, channel_id: &str, limit: u16) -> Result<Vec<TranscriptMessage>, Error> {
        let mut state = self.state.lock().await;
        state.calls.push(ProvisionCall::Fetch(channel_id.to_string()));
        Self::require_live(&state, channel_id)?;
        Ok(state
            .messages
            .get(channel_id)
            .map(|m| m.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_notice(&self, channel_id: &str, text: &str) -> Result<(), Error> {
        let call = ProvisionCall::Notice {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        };
        self.record(call, channel_id).await;
        let state = self.state.lock().await;
        if state.fail_notices {
            return Err(Error::Platform("simulated notice failure".into()));
        }
        Self::require_live(&state, channel_id)
    }
}

/// Ticket storage over an `InMemoryStore` that can fail or stall the write
/// that closes a given ticket. Reads and every other write pass through.
pub struct ScriptedTicketStore {
    inner: Arc<InMemoryStore>,
    failing_closes: Mutex<HashSet<String>>,
    close_delay: Option<Duration>,
}

impl ScriptedTicketStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            failing_closes: Mutex::new(HashSet::new()),
            close_delay: None,
        }
    }

    /// Each close is written, then the call sleeps before returning.
    pub fn with_close_delay(inner: Arc<InMemoryStore>, delay: Duration) -> Self {
        Self {
            close_delay: Some(delay),
            ..Self::new(inner)
        }
    }

    /// Writes that would store this ticket as closed fail without storing anything.
    pub async fn fail_close_of(&self, ticket_id: &str) {
        self.failing_closes.lock().await.insert(ticket_id.to_string());
    }
}

#[async_trait]
impl TicketRepository for ScriptedTicketStore {
    async fn get_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<Option<Ticket>, Error> {
        self.inner.get_ticket(guild_id, ticket_id).await
    }

    async fn get_ticket_by_channel(&self, guild_id: &str, channel_id: &str) -> Result<Option<Ticket>, Error> {
        self.inner.get_ticket_by_channel(guild_id, channel_id).await
    }

    async fn save_ticket(&self, guild_id: &str, ticket: &Ticket) -> Result<(), Error> {
        let closing = ticket.status == TicketStatus::Closed;
        if closing && self.failing_closes.lock().await.contains(&ticket.ticket_id) {
            return Err(Error::Io(std::io::Error::other(format!(
                "simulated storage failure for {}",
                ticket.ticket_id
            ))));
        }
        self.inner.save_ticket(guild_id, ticket).await?;
        if let (true, Some(delay)) = (closing, self.close_delay) {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn delete_ticket(&self, guild_id: &str, ticket_id: &str) -> Result<(), Error> {
        self.inner.delete_ticket(guild_id, ticket_id).await
    }

    async fn get_all_tickets(&self, guild_id: &str, filter: &TicketFilter) -> Result<Vec<Ticket>, Error> {
        self.inner.get_all_tickets(guild_id, filter).await
    }

    async fn next_ticket_sequence(&self, guild_id: &str) -> Result<u64, Error> {
        self.inner.next_ticket_sequence(guild_id).await
    }
}

/// A fully wired engine over the in-memory store and a given provisioner.
pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub provisioner: Arc<FakeProvisioner>,
    pub engine: Arc<TicketService>,
    pub bulk: Arc<BulkActionService>,
    pub configs: Arc<GuildConfigService>,
    pub bus: Arc<EventBus>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_provisioner(Arc::new(FakeProvisioner::new()))
    }

    pub fn with_provisioner(provisioner: Arc<FakeProvisioner>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_parts(store.clone(), store, provisioner, EngineConfig::immediate())
    }

    /// `tickets` is what the engine writes through; `store` backs configs,
    /// transcripts and the harness's own helpers.
    pub fn with_parts(
        store: Arc<InMemoryStore>,
        tickets: Arc<dyn TicketRepository>,
        provisioner: Arc<FakeProvisioner>,
        config: EngineConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let engine = Arc::new(
            TicketService::new(tickets, store.clone(), store.clone(), provisioner.clone(), config)
                .with_event_bus(bus.clone()),
        );
        let bulk = Arc::new(BulkActionService::new(engine.clone()));
        let configs = Arc::new(
            GuildConfigService::new(store.clone()).with_provisioner(provisioner.clone()),
        );
        Self { store, provisioner, engine, bulk, configs, bus }
    }

    /// Category and one staff role set, everything else default.
    pub async fn configure_guild(&self, guild_id: &str) -> Result<GuildConfig, Error> {
        self.configs.set_category(guild_id, TEST_CATEGORY).await?;
        self.configs.add_staff_role(guild_id, TEST_STAFF_ROLE).await?;
        self.store.get_guild_config(guild_id).await
    }

    pub async fn edit_config<F>(&self, guild_id: &str, edit: F) -> Result<(), Error>
    where
        F: FnOnce(&mut GuildConfig),
    {
        let mut cfg = self.store.get_guild_config(guild_id).await?;
        edit(&mut cfg);
        self.store.set_guild_config(guild_id, &cfg).await
    }

    pub async fn open_ticket(&self, guild_id: &str, author_id: &str) -> Result<Ticket, Error> {
        self.engine.create_ticket(create_request(guild_id, author_id)).await
    }

    /// Moves the ticket's creation and last activity `days` into the past.
    pub async fn age_ticket(&self, guild_id: &str, ticket_id: &str, days: i64) -> Result<Ticket, Error> {
        let mut ticket = self
            .store
            .get_ticket(guild_id, ticket_id)
            .await?
            .ok_or_else(|| Error::NotFound(ticket_id.to_string()))?;
        let then = Utc::now() - chrono::Duration::days(days);
        ticket.created_at = then;
        ticket.last_activity_at = Some(then);
        self.store.save_ticket(guild_id, &ticket).await?;
        Ok(ticket)
    }

    pub fn dispatcher(&self, policy: RateLimitPolicy) -> Dispatcher {
        Dispatcher::new(
            CommandRegistry::standard(self.engine.clone(), self.bulk.clone(), self.configs.clone()),
            Arc::new(RateLimiter::new()),
            policy,
            self.store.clone(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_engine(
    store: Arc<InMemoryStore>,
    provisioner: Arc<dyn ChannelProvisioner>,
    config: EngineConfig,
) -> TicketService {
    TicketService::new(store.clone(), store.clone(), store, provisioner, config)
}

pub fn create_request(guild_id: &str, author_id: &str) -> CreateTicketRequest {
    CreateTicketRequest {
        guild_id: guild_id.to_string(),
        author_id: author_id.to_string(),
        author_tag: format!("user{author_id}"),
        template_index: 0,
        reason: Some("help".to_string()),
        description: None,
    }
}

pub fn message(id: &str, author: &str, content: &str, minutes_ago: i64) -> TranscriptMessage {
    TranscriptMessage {
        id: id.to_string(),
        author_id: author.to_string(),
        author_tag: format!("user{author}"),
        content: content.to_string(),
        timestamp: Utc::now() - chrono::Duration::minutes(minutes_ago),
        attachments: Vec::new(),
    }
}

/// Connects to `TEST_DATABASE_URL`, migrates, and starts from empty tables.
pub async fn setup_test_database() -> Result<Database, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://ticketbot@localhost/ticketbot_test".to_string());

    let db = Database::new(&url, 5).await?;
    db.migrate().await?;
    clean_database(db.pool()).await?;
    Ok(db)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("TRUNCATE TABLE tickets, ticket_counters, guild_configs, ticket_transcripts")
        .execute(pool)
        .await?;
    Ok(())
}
