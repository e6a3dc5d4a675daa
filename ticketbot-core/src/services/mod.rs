// File: src/services/mod.rs

pub mod ticket_id;
pub mod ticket_service;
pub mod bulk_actions;
pub mod config_service;
pub mod dispatch;

pub use ticket_id::TicketIdGenerator;
pub use ticket_service::{CloseMode, CreateTicketRequest, EngineConfig, TicketService};
pub use bulk_actions::{BulkActionService, BulkReport};
pub use config_service::{ConfigChange, GuildConfigService};
pub use dispatch::{
    ActionResult, CommandHandler, CommandRegistry, DispatchOutcome, Dispatcher, InboundRequest,
    RequestSource, TicketAction,
};
