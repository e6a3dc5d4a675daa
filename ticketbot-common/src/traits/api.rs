// File: ticketbot-common/src/traits/api.rs

use async_trait::async_trait;

use crate::error::Error;
use crate::models::{ChannelSpec, TranscriptMessage};

/// Channel-level side effects on the messaging platform.
///
/// Implementations return `Error::Platform` (or `Error::NotFound` for a
/// missing channel); the engine decides which failures are fatal.
#[async_trait]
pub trait ChannelProvisioner: Send + Sync {
    /// Creates a text channel and returns its id.
    async fn create_channel(&self, guild_id: &str, spec: &ChannelSpec) -> Result<String, Error>;

    /// Creates a channel category and returns its id.
    async fn create_category(&self, guild_id: &str, name: &str) -> Result<String, Error>;

    async fn delete_channel(&self, channel_id: &str) -> Result<(), Error>;
    async fn set_channel_parent(&self, channel_id: &str, category_id: &str) -> Result<(), Error>;

    async fn grant_participant(&self, channel_id: &str, user_id: &str) -> Result<(), Error>;
    async fn revoke_participant(&self, channel_id: &str, user_id: &str) -> Result<(), Error>;

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, Error>;

    /// Up to `limit` most recent messages, newest first.
    async fn fetch_messages(&self, channel_id: &str, limit: u16) -> Result<Vec<TranscriptMessage>, Error>;

    async fn send_notice(&self, channel_id: &str, text: &str) -> Result<(), Error>;
}
