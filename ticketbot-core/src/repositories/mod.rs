// src/repositories/mod.rs

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{
    PostgresGuildConfigRepository, PostgresTicketRepository, PostgresTranscriptRepository,
};
