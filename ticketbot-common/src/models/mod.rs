// File: ticketbot-common/src/models/mod.rs
pub mod ticket;
pub mod guild_config;
pub mod channel;
pub mod transcript;
pub mod stats;

pub use ticket::{Ticket, TicketFilter, TicketStatus, AUTO_CLOSE_ACTOR};
pub use guild_config::{FeatureFlags, GuildConfig, TicketTemplate};
pub use channel::{ChannelPermission, ChannelSpec, OverwriteTarget, PermissionGrant};
pub use transcript::{Transcript, TranscriptMessage};
pub use stats::TicketStats;
