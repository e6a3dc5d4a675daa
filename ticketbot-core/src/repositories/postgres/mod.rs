// src/repositories/postgres/mod.rs

pub mod tickets;
pub mod guild_config;
pub mod transcripts;

pub use tickets::PostgresTicketRepository;
pub use guild_config::PostgresGuildConfigRepository;
pub use transcripts::PostgresTranscriptRepository;
