pub mod api;
pub mod repository_traits;

pub use api::ChannelProvisioner;
pub use repository_traits::{GuildConfigRepository, TicketRepository, TranscriptRepository};
