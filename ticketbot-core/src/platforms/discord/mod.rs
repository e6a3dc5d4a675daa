// File: ticketbot-core/src/platforms/discord/mod.rs

pub mod commands;
pub mod interactions;
pub mod provisioner;
pub mod runtime;

pub use provisioner::DiscordChannelProvisioner;
pub use runtime::DiscordRuntime;
